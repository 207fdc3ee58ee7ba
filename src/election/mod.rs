pub mod bid;
pub mod coordinator;
pub mod dispatcher;
pub mod initiator;
pub mod shared;
pub mod state;

pub use coordinator::{ElectionCoordinator, Evaluated, Outcome};
pub use dispatcher::{Submission, TokenDispatcher};
pub use initiator::ElectionInitiator;
pub use shared::SharedPlant;
pub use state::{Action, ElectionToken, PlantState, PlantStatus, RingUpdate, TokenKind};
