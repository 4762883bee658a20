//! Customer-service desk: customers, tickets and account summaries, served
//! to agents as MCP tools, resources and prompts.
//!
//! [`Desk`] implements [`mcp::Handler`], so running it as a tool host is a
//! single call:
//!
//! ```no_run
//! # async fn example() -> mcp::Result<()> {
//! mcp::serve_stdio(&desk::Desk::seeded()).await
//! # }
//! ```

mod account;
mod customer;
mod error;
mod prompt;
mod service;
mod store;
mod ticket;

pub use account::AccountValue;
pub use customer::{AccountStatus, Customer};
pub use error::{Error, Result};
pub use prompt::{SERVICE_RESPONSE_PROMPT, parse_steps, service_response_prompt};
pub use service::{
    CALCULATE_ACCOUNT_VALUE, CREATE_SUPPORT_TICKET, Desk, GET_RECENT_CUSTOMERS, SERVER_NAME,
};
pub use store::CustomerStore;
pub use ticket::{Priority, Ticket, TicketRequest, TicketStatus};
