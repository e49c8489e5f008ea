use std::sync::Arc;

use crate::db::DBLayer;
use crate::provider::IdentityProvider;
use crate::revocation::RevocationHub;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DBLayer>,
    pub hub: Arc<RevocationHub>,
    pub jwt_secret: String,
    /// Used only by the admin logout-all endpoint to revoke refresh
    /// credentials. Absent when the provider doesn't support it.
    pub provider: Option<Arc<dyn IdentityProvider>>,
}
