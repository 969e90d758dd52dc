pub mod decision_engine;
pub mod error;
pub mod frequency_table;
pub mod governor;
pub mod load_sampler;
pub mod policy;
pub mod powersave_bias;
pub mod sample_state;
mod scheduler;
pub mod ticks;
pub mod tunables;
