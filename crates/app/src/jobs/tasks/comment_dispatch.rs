use crate::jobs::shutdown::Shutdown;
use crate::state::AppState;
use quill_core::domain::items::GeneratedResponse;

pub async fn deliver(state: &AppState, response: GeneratedResponse, shutdown: &mut Shutdown) -> bool {
    state
        .dispatcher
        .post(&response.item_id, &response.text, shutdown)
        .await
        .is_some()
}
