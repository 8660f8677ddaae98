//! Integration tests exercising the engine end to end.

mod engine_scenarios;
mod stack_properties;
