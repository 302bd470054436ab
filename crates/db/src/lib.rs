pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, DbPool};
pub use repositories::{
    DecisionRepository, InMemoryDecisionRepository, InMemoryRuleRepository,
    InMemorySlaTimerRepository, NewDecision, RepositoryError, RuleRepository,
    SlaTimerRepository, SqlDecisionRepository, SqlRuleRepository, SqlSlaTimerRepository,
};
