pub mod clarification;
pub mod commit;
pub mod dates;
pub mod error;
pub mod intent;
pub mod intervention;
pub mod phrases;
pub mod plan;
pub mod preview;
pub mod validation;
