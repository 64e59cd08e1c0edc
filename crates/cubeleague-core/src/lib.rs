// Library root for the auto-draft decision and queue coordination engine.
//
// Every store, turn, membership and broadcast access goes through the
// collaborator traits in `ports`, so the scorer, queue, vote, resolver and
// gateway logic can run against SQLite in production or the in-memory
// adapters in tests.

pub mod card;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod ports;
pub mod queue;
pub mod resolver;
pub mod scorer;
pub mod turn;
pub mod votes;

pub use card::{Balance, CardId, CardInstance, Color, DraftedCard, InstanceId, Rarity, TeamId, UserId};
pub use engine::{DraftEngine, TurnOutcome};
pub use error::DraftError;
pub use ports::Collaborators;
pub use turn::DraftTurnState;
