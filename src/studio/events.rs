use crate::export::delivery::DeliveryReceipt;
use crate::export::{ExportKind, ExportRequest};

#[derive(Debug, Clone, PartialEq)]
pub enum StudioCommand {
    Export(ExportRequest),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudioEvent {
    ExportStarted {
        kind: ExportKind,
    },
    ExportDelivered {
        kind: ExportKind,
        receipt: DeliveryReceipt,
    },
    ExportFailed {
        kind: ExportKind,
        error: String,
    },
}

impl StudioEvent {
    pub fn kind(&self) -> ExportKind {
        match self {
            Self::ExportStarted { kind }
            | Self::ExportDelivered { kind, .. }
            | Self::ExportFailed { kind, .. } => *kind,
        }
    }

    pub fn status_line(&self) -> String {
        match self {
            Self::ExportStarted { kind } => format!("Exporting {}...", kind.as_str()),
            Self::ExportDelivered { receipt, .. } => receipt.describe(),
            Self::ExportFailed { kind, error } => {
                format!("{} export failed: {error}", kind.as_str())
            }
        }
    }
}
