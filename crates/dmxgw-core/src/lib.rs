//! Gateway-side core: configuration, the light catalogue, the DMX state
//! coordinator, and the scheduler.

pub mod catalogue;
pub mod config;
pub mod coordinator;
pub mod scheduler;

pub use catalogue::{split_target, CatalogueError, ChannelBinding, Light, LightCatalogue, LightGroup};
pub use config::{Config, ConfigError, HttpConfig, ModbusConfig, MqttConfig, RawChannelBinding};
pub use coordinator::{CoordinatorError, DmxStateCoordinator, Snapshot, SubscriberId};
pub use scheduler::{ScheduleEvent, ScheduledAction, Scheduler, SchedulerError, TimeOfDay};
