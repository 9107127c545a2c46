pub mod enrollment;
pub mod exchange;
pub mod framing;
pub mod message;
pub mod operation;
pub mod service;
pub mod session;
pub mod transport;
pub mod verification;

pub use crate::domain::model::{
    Command, EnrollmentOutcome, PortInfo, SlotId, Stage, VerificationOutcome,
};
pub use crate::domain::ports::{
    ConfigProvider, EnrollmentListener, PortOpener, SerialLink, UserDirectory,
    VerificationListener,
};
pub use crate::utils::error::Result;
