pub mod args;
pub mod capture;
pub mod emitter;
pub mod input;
pub mod output;
pub mod plugin;
pub mod proto;
pub mod settings;
