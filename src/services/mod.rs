pub mod aggregator;
pub mod data_service;
pub mod dispatch;
pub mod publisher;
pub mod scheduler;
pub mod shutdown;
#[cfg(feature = "websocket")]
pub mod socket_server;
pub mod writer;

pub use aggregator::{Aggregator, EnergyData, FullCycle, MeterValue, PowerData};
pub use data_service::{DataService, ServiceReport};
pub use dispatch::{Dispatcher, QueueCommand, WorkerReport};
pub use scheduler::{CycleKind, Scheduler};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal, Signals, WorkerHandle};
#[cfg(feature = "websocket")]
pub use socket_server::WebSocketPublisher;
