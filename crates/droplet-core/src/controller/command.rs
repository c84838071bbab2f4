use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::camera::FrameSource;
use crate::config::{ConfigPatch, DetectionConfig};
use crate::error::{DetectorError, Result};
use crate::histogram::HistogramPayload;
use crate::profile::ProfileLayout;

use super::timing::StageSummary;
use super::{ControllerStatistics, ControllerStatus, DetectionController};

/// Requests accepted at the controller's API boundary.
///
/// Serialized with a `command` tag, e.g.
/// `{"command": "export", "format": "csv"}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControllerCommand {
    Start,
    Stop,
    Reset,
    Status,
    Histogram,
    Statistics,
    Performance,
    Export {
        format: String,
    },
    UpdateConfig {
        config: ConfigPatch,
    },
    LoadProfile {
        path: PathBuf,
    },
    SaveProfile {
        path: PathBuf,
        #[serde(default)]
        layout: ProfileLayout,
    },
}

impl ControllerCommand {
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| DetectorError::InvalidCommand(e.to_string()))
    }
}

/// Result of a dispatched command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum CommandResponse {
    Ack { message: String },
    Status(ControllerStatus),
    Histogram(HistogramPayload),
    Statistics(ControllerStatistics),
    Performance(BTreeMap<String, StageSummary>),
    Export { format: String, body: String },
    Config(DetectionConfig),
}

fn ack(message: &str) -> CommandResponse {
    CommandResponse::Ack {
        message: message.to_string(),
    }
}

impl DetectionController {
    /// Run one command against the controller. `camera` is the frame source
    /// the controller is attached to; only `Start` reads from it.
    pub fn dispatch(
        &self,
        command: ControllerCommand,
        camera: &dyn FrameSource,
    ) -> Result<CommandResponse> {
        match command {
            ControllerCommand::Start => self.handle_start(camera),
            ControllerCommand::Stop => self.handle_stop(),
            ControllerCommand::Reset => self.handle_reset(),
            ControllerCommand::Status => Ok(CommandResponse::Status(self.status())),
            ControllerCommand::Histogram => Ok(CommandResponse::Histogram(self.histogram())),
            ControllerCommand::Statistics => Ok(CommandResponse::Statistics(self.statistics())),
            ControllerCommand::Performance => Ok(CommandResponse::Performance(self.performance())),
            ControllerCommand::Export { format } => self.handle_export(format),
            ControllerCommand::UpdateConfig { config } => {
                let next = self.update_config(&config)?;
                Ok(CommandResponse::Config((*next).clone()))
            }
            ControllerCommand::LoadProfile { path } => {
                let next = self.load_profile(&path)?;
                Ok(CommandResponse::Config((*next).clone()))
            }
            ControllerCommand::SaveProfile { path, layout } => {
                self.save_profile(&path, layout)?;
                Ok(ack("profile saved"))
            }
        }
    }

    fn handle_start(&self, camera: &dyn FrameSource) -> Result<CommandResponse> {
        self.start(camera)?;
        Ok(ack("detection started"))
    }

    fn handle_stop(&self) -> Result<CommandResponse> {
        self.stop();
        Ok(ack("detection stopped"))
    }

    fn handle_reset(&self) -> Result<CommandResponse> {
        self.reset();
        Ok(ack("detector reset"))
    }

    fn handle_export(&self, format: String) -> Result<CommandResponse> {
        let body = self.export(&format)?.ok_or(DetectorError::NoExportData)?;
        Ok(CommandResponse::Export {
            format: format.to_ascii_lowercase(),
            body,
        })
    }
}
