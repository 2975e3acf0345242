use std::sync::Arc;
use anyhow::Result;
use log::info;
use tokio::runtime::Handle;
use crate::input::{HttpInput, UdpInput};
use crate::output::{HttpOutput, NullOutput, StdOutput, UdpOutput};
use crate::settings::Settings;
use super::{Reader, Writer};

/// Every plugin active for the lifetime of the process. Outputs that
/// can also be read from are registered as outputs, and their replayed
/// responses are listed separately.
#[derive(Default)]
pub struct Plugins {
    pub inputs:    Vec<Arc<dyn Reader>>,
    pub outputs:   Vec<Arc<dyn Writer>>,
    pub responses: Vec<Arc<dyn Reader>>,
}

impl Plugins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input<T: Reader + 'static>(&mut self, plugin: T) {
        self.inputs.push(Arc::new(plugin));
    }

    pub fn output<T: Writer + 'static>(&mut self, plugin: T) {
        self.outputs.push(Arc::new(plugin));
    }

    pub fn duplex<T: Reader + Writer + 'static>(&mut self, plugin: T) {
        let plugin = Arc::new(plugin);
        self.outputs.push(plugin.clone());
        self.responses.push(plugin);
    }

    pub fn close(&self) {
        self.inputs.iter().for_each(|p| p.close());
        self.outputs.iter().for_each(|p| p.close());
    }
}

pub fn init(settings: &Settings, handle: &Handle) -> Result<Plugins> {
    let mut plugins = Plugins::new();

    if settings.output_stdout {
        plugins.output(StdOutput::new());
    }

    if settings.output_null {
        plugins.output(NullOutput::new());
    }

    for addr in &settings.input_udp {
        plugins.input(UdpInput::new(addr, settings.input_udp_track_response)?);
    }

    for addr in &settings.input_http {
        plugins.input(HttpInput::new(addr, handle)?);
    }

    for addr in &settings.output_udp {
        let cfg = settings.output_udp_config.clone();
        plugins.duplex(UdpOutput::new(addr, cfg)?);
    }

    for addr in &settings.output_http {
        let cfg = settings.output_http_config.clone();
        plugins.duplex(HttpOutput::new(addr, cfg, handle.clone())?);
    }

    info!("{} inputs, {} outputs", plugins.inputs.len(), plugins.outputs.len());

    Ok(plugins)
}
