mod fetch;
mod render;
mod round;

pub use round::{ConcurrencyMode, Ctx, RoundHook, Scheduler};

#[cfg(test)]
mod tests;
