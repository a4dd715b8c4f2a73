pub mod chart;
pub mod clock;
pub mod judgment;
pub mod life;
pub mod parsing;
pub mod player;
pub mod scores;
pub mod session;
pub mod song;
pub mod stage_stats;
pub mod timing;
pub mod timing_windows;
