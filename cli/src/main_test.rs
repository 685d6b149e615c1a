use super::*;
use recipebox::router::{RouteMatch, View};
use recipebox::state::auth::LoginFailure;

fn login_nav() -> Navigation {
    Navigation::Render {
        route: RouteMatch { view: View::Login, path: "/login".to_owned(), params: Default::default() },
        redirected_from: None,
    }
}

// =============================================================================
// settle
// =============================================================================

#[test]
fn settle_keeps_login_failure_message_when_session_event_fired() {
    let failed = Err(CliError::Auth(AuthError::LoginFailed { source: LoginFailure::MissingToken }));

    let err = settle(failed, Some(login_nav())).unwrap_err();

    assert!(matches!(err, CliError::Auth(_)));
    assert_eq!(err.to_string(), "Login failed. Please check your credentials.");
}

#[test]
fn settle_reports_expiry_after_successful_command() {
    let err = settle(Ok(()), Some(login_nav())).unwrap_err();
    assert!(matches!(err, CliError::SessionExpired));
}

#[test]
fn settle_passes_through_without_events() {
    assert!(settle(Ok(()), None).is_ok());
    let err = settle(Err(CliError::NotFound("/nope".to_owned())), None).unwrap_err();
    assert!(matches!(err, CliError::NotFound(_)));
}

// =============================================================================
// argument parsing
// =============================================================================

#[test]
fn search_size_zero_is_rejected() {
    assert!(Cli::try_parse_from(["recipebox", "search", "soup", "--size", "0"]).is_err());
}

#[test]
fn search_size_positive_is_accepted() {
    let cli = Cli::try_parse_from(["recipebox", "search", "soup", "--size", "5", "--page", "2"]).unwrap();
    match cli.command {
        Command::Search { query, page, size } => {
            assert_eq!(query, "soup");
            assert_eq!(page, 2);
            assert_eq!(size, Some(5));
        }
        other => panic!("expected Search, got {other:?}"),
    }
}
