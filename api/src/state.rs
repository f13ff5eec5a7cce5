use sqlx::PgPool;

use crate::drafter::DrafterClient;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub drafter: DrafterClient,
}
