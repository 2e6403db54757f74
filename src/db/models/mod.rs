pub mod agent;
pub mod lead;
pub mod leaderboard;
pub mod settings;
