pub mod outbox;
pub mod providers;
pub mod service;
pub mod sweeper;

pub use outbox::{event_names, DomainEvent, EventPublisher, InMemoryPublisher, TracingPublisher};
pub use providers::{
    ConsentProvider, InMemoryConsentDirectory, InMemoryRoster, InMemoryTenantDirectory,
    RosterProvider, TenantContextProvider,
};
pub use service::{
    CapacityRow, RouteAssignmentResult, RoutingEngine, SatisfyReport, SlaDashboard, SweepReport,
};
pub use sweeper::Sweeper;
