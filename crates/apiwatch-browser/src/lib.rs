mod error;
pub mod events;
pub mod exchange;
pub mod monitor;
pub mod session;

pub use error::{Error, Result};
pub use events::NetworkEvent;
pub use exchange::{CompletedExchange, ExchangeTable, FetchedBody, PendingExchange};
pub use monitor::TrafficMonitor;
pub use session::{BrowserSession, LogStream, SessionConfig};
