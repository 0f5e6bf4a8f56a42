//! Domain model (records, messages, states, errors).

pub mod errors;
pub mod ids;
pub mod message;
pub mod policy;
pub mod record;
pub mod state;

pub use self::errors::{BoxError, OutboxError, RecordNotFound};
pub use self::ids::{MachineId, RecordId};
pub use self::message::Message;
pub use self::policy::RetrialPolicy;
pub use self::record::{Record, RecordLock};
pub use self::state::RecordState;
