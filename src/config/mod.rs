pub mod settings;

pub use settings::{
    Config,
    InfluxConfig,
    MetersConfig,
    ParityConfig,
    PublisherConfig,
    ScheduleConfig,
    SerialConfig,
};
