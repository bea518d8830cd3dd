#![crate_name = "stagehand"]

pub mod stage_compiler;
