//! life-scheduler: one outfit and daily plan per calendar day for a
//! conversational persona.
//!
//! Triggers (daily timer, prompt hook, commands) → generation guard →
//! context → prompt → LLM → JSON extraction → day-keyed store.

pub mod api;
pub mod calendar;
pub mod clock;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod generator;
pub mod guard;
pub mod llm;
pub mod persist;
pub mod persona;
pub mod pipeline;
pub mod prompt;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod store;
pub mod variety;
