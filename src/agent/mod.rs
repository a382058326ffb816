//! Control agent: command dispatch and the boot lifecycle around it

pub mod dispatcher;
pub mod lifecycle;

pub use dispatcher::{
    classify, state_text, Command, Dispatcher, Reply, CONTROL_SUBJECT, CONTROL_SUBSCRIPTION_ID,
};
pub use lifecycle::{AgentLifecycle, BootPhase, Halt};
