mod bets;
mod leaderboard;
mod players;
mod rounds;

pub use bets::*;
pub use leaderboard::*;
pub use players::*;
pub use rounds::*;
