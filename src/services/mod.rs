pub mod budget;
pub mod evaluation;
pub mod ledger;
pub mod llm;
pub mod processor;
pub mod prompt;
pub mod queue;
pub mod retry;
pub mod worker;
