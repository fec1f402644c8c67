//! Bridge lifecycle: attach, reset, serve, tear down
//!
//! ```text
//! Initializing -> AttachingInputs -> AttachingOutputs -> Resetting -> Serving
//!                                                                      |
//!                     Closed <- Stopping <-----------------------------+
//! ```
//!
//! Any exit from the phases, normal or not, goes through Stopping and Closed,
//! and the registry is closed exactly once on the way.

use anyhow::Result;
use oscbank_core::{AddressScheme, Direction, RunState};
use oscbank_hw::{AttachmentSequencer, ChannelRegistry, Driver, SequenceError};
use oscbank_osc::{Dispatcher, OscSender, OscServer};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::classifier::ErrorClassifier;
use crate::config::Config;
use crate::listener::DriverEvents;
use crate::router::{run_outbound, EventRouter, OutboundMessage};
use crate::server;
use crate::state::StatusState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initializing,
    AttachingInputs,
    AttachingOutputs,
    Resetting,
    Serving,
    Stopping,
    Closed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initializing => "initializing",
            Self::AttachingInputs => "attaching_inputs",
            Self::AttachingOutputs => "attaching_outputs",
            Self::Resetting => "resetting",
            Self::Serving => "serving",
            Self::Stopping => "stopping",
            Self::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// One run of the bridge between a channel bank and OSC
pub struct Bridge {
    config: Config,
    run_state: RunState,
    scheme: AddressScheme,
    registry: Arc<ChannelRegistry>,
    dispatcher: Arc<Dispatcher>,
    classifier: Arc<ErrorClassifier>,
    outbound_rx: Option<mpsc::UnboundedReceiver<OutboundMessage>>,
    phase: watch::Sender<Phase>,
}

impl Bridge {
    /// Configure the channel banks and the routing tables
    pub fn new(config: Config, driver: &dyn Driver) -> Result<Self> {
        config.validate()?;
        let (phase, _) = watch::channel(Phase::Initializing);
        let run_state = RunState::new();

        let scheme = AddressScheme::new(config.device_serial(), &config.device.model_tag);
        info!(scope = %scheme.scope(), "Address scheme selected");

        let (router, outbound_rx) = EventRouter::new(scheme.clone(), run_state.clone());
        let router = Arc::new(router);
        let classifier = Arc::new(ErrorClassifier::new(run_state.clone()));
        let listener = Arc::new(DriverEvents::new(router.clone(), classifier.clone()));

        let registry = Arc::new(ChannelRegistry::configure(
            driver,
            config.device_serial(),
            config.device.channels,
            listener,
        )?);
        let dispatcher = Arc::new(router.build_dispatcher(&registry));

        Ok(Self {
            config,
            run_state,
            scheme,
            registry,
            dispatcher,
            classifier,
            outbound_rx: Some(outbound_rx),
            phase,
        })
    }

    /// Handle for requesting a stop from outside the bridge
    pub fn run_state(&self) -> RunState {
        self.run_state.clone()
    }

    pub fn registry(&self) -> Arc<ChannelRegistry> {
        self.registry.clone()
    }

    pub fn scheme(&self) -> &AddressScheme {
        &self.scheme
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: Phase) {
        info!(phase = %phase, "Entering phase");
        self.phase.send_replace(phase);
    }

    /// Walk every phase, then tear down whatever happened.
    ///
    /// A stop caused by a fatal driver error is returned as an error; a stop
    /// requested from outside is not.
    pub async fn run(mut self) -> Result<()> {
        let mut tasks = Vec::new();
        let result = self.run_phases(&mut tasks).await;

        self.set_phase(Phase::Stopping);
        self.run_state.request_stop();
        for task in &tasks {
            task.abort();
        }
        self.registry.close();
        self.set_phase(Phase::Closed);

        let aborted = matches!(
            result.as_ref().err().and_then(|e| e.downcast_ref::<SequenceError>()),
            Some(SequenceError::Aborted)
        );
        let result: Result<()> = match (result, self.classifier.fatal()) {
            (Ok(()), Some(fatal)) => Err(fatal.into()),
            (Err(_), Some(fatal)) if aborted => Err(fatal.into()),
            (Err(_), None) if aborted => {
                warn!("Stop requested during attachment");
                Ok(())
            }
            (result, _) => result,
        };
        if let Err(e) = &result {
            error!(error = %e, "Bridge failed");
        }
        result
    }

    async fn run_phases(&mut self, tasks: &mut Vec<JoinHandle<()>>) -> Result<()> {
        let client_addr = self.config.client_addr()?;
        let sender = OscSender::new(client_addr).await?;
        info!(target_addr = %client_addr, "OSC client ready");
        if let Some(rx) = self.outbound_rx.take() {
            tasks.push(tokio::spawn(run_outbound(rx, sender, self.run_state.clone())));
        }

        let sequencer =
            AttachmentSequencer::new(self.config.to_attach_config(), self.run_state.clone());

        self.set_phase(Phase::AttachingInputs);
        sequencer.attach_bank(&self.registry, Direction::Input).await?;

        self.set_phase(Phase::AttachingOutputs);
        sequencer.attach_bank(&self.registry, Direction::Output).await?;

        self.set_phase(Phase::Resetting);
        sequencer.reset_outputs(&self.registry).await?;

        let server = OscServer::bind(self.config.server_addr()?, self.dispatcher.clone()).await?;
        info!(
            address = %server.local_addr()?,
            routes = self.dispatcher.len(),
            "OSC server listening"
        );
        let run_state = self.run_state.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = server.serve().await {
                error!(error = %e, "OSC server failed");
                run_state.request_stop();
            }
        }));

        if let Some(bind) = self.config.status_addr()? {
            let state = StatusState::new(
                self.registry.clone(),
                self.scheme.clone(),
                self.run_state.clone(),
                self.phase.subscribe(),
            );
            tasks.push(tokio::spawn(async move {
                if let Err(e) = server::run(state, bind).await {
                    error!(error = %e, "Status server failed");
                }
            }));
        }

        self.set_phase(Phase::Serving);
        let mut ticker = interval(self.config.poll_interval());
        while self.run_state.is_running() {
            ticker.tick().await;
        }
        info!("Stop requested, leaving serve loop");
        Ok(())
    }
}
