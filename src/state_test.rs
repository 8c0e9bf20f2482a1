use super::*;
use crate::llm::mock::MockModel;

#[tokio::test]
async fn test_state_has_no_ai_clients() {
    let state = test_helpers::test_app_state();
    assert!(state.llm.is_none());
    assert!(state.imaging.is_none());
    assert_eq!(state.auth.register_code.as_deref(), Some(test_helpers::TEST_REGISTER_CODE));
}

#[tokio::test]
async fn clones_share_the_text_model() {
    let state = test_helpers::test_app_state_with_llm(Arc::new(MockModel::new(2, Vec::new())));
    let clone = state.clone();
    let a = state.llm.as_ref().unwrap();
    let b = clone.llm.as_ref().unwrap();
    a.rotate_key();
    assert_eq!(b.active_key_index(), 1);
}

#[test]
fn default_auth_settings_reject_registration() {
    let settings = AuthSettings::default();
    assert!(settings.register_code.is_none());
    assert!(!settings.cookie_secure);
}
