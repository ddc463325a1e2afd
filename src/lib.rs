//! Code-interpreter agent: a hosted model decides what Python to run, a remote
//! notebook sandbox runs it, and rendered outputs are downloaded locally.

pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod interpreter;
pub mod llm;
pub mod printer;
pub mod sandbox;
pub mod session;
