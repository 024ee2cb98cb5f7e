//! Client side of the session contract: the backend transport, the typed auth
//! endpoints, and the authenticated client that renews credentials.

mod authenticated;
mod backend;
mod signal;
pub mod navigation;
pub mod transport;

pub use authenticated::AuthenticatedClient;
pub use backend::BackendApi;
pub use navigation::{navigate, navigation_client, Navigation};
pub use signal::{LogoutEvent, LogoutReason, LogoutSignal};
pub use transport::{error_message, ApiRequest, ApiResponse, ReqwestTransport, Transport, TransportError};
