//! In-memory customer store.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::customer::{AccountStatus, Customer};
use crate::ticket::{Ticket, TicketRequest, TicketStatus, ticket_id};
use crate::{Error, Result};

/// Owned customer and ticket data.
///
/// Customers keep their insertion order. Share one store between handlers by
/// wrapping it in an `Arc`.
#[derive(Debug, Default)]
pub struct CustomerStore {
    customers: RwLock<Vec<Customer>>,
    tickets: RwLock<Vec<Ticket>>,
    ticket_seq: AtomicU64,
}

impl CustomerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the demo customers.
    pub fn seeded() -> Self {
        let alice = Customer {
            id: "12345".into(),
            name: "Alice Johnson".into(),
            email: "alice@example.com".into(),
            phone: Some("+1-555-0123".into()),
            account_status: AccountStatus::Active,
            last_interaction: Some(Utc::now()),
        };
        let bob = Customer {
            id: "67890".into(),
            name: "Bob Smith".into(),
            email: "bob@example.com".into(),
            phone: None,
            account_status: AccountStatus::Suspended,
            last_interaction: None,
        };

        Self {
            customers: RwLock::new(vec![alice, bob]),
            ..Self::default()
        }
    }

    /// Add a customer. Ids must be unique.
    pub async fn insert(&self, customer: Customer) -> Result<()> {
        customer.validate()?;
        let mut customers = self.customers.write().await;
        if customers.iter().any(|c| c.id == customer.id) {
            return Err(Error::Validation(format!(
                "Customer {} already exists",
                customer.id
            )));
        }
        customers.push(customer);
        Ok(())
    }

    /// Look up a customer by id.
    pub async fn get(&self, id: &str) -> Option<Customer> {
        let customers = self.customers.read().await;
        customers.iter().find(|c| c.id == id).cloned()
    }

    /// All customers in insertion order.
    pub async fn list(&self) -> Vec<Customer> {
        self.customers.read().await.clone()
    }

    /// Up to `limit` customers, most recent interaction first.
    ///
    /// Customers never interacted with come last; ties keep insertion order.
    pub async fn recent(&self, limit: usize) -> Vec<Customer> {
        let mut customers = self.list().await;
        // `None < Some(_)`, so comparing b to a puts missing timestamps last.
        customers.sort_by(|a, b| b.last_interaction.cmp(&a.last_interaction));
        customers.truncate(limit);
        customers
    }

    /// Open a ticket for an existing customer.
    pub async fn create_ticket(&self, request: TicketRequest) -> Result<Ticket> {
        let priority = request.priority()?;

        if self.get(&request.customer_id).await.is_none() {
            return Err(Error::Domain(format!(
                "Customer {} not found",
                request.customer_id
            )));
        }

        let created_at = Utc::now();
        let seq = self.ticket_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let ticket = Ticket {
            ticket_id: ticket_id(created_at, seq),
            customer_id: request.customer_id,
            subject: request.subject,
            description: request.description,
            priority,
            status: TicketStatus::Open,
            created_at,
        };

        debug!(ticket = %ticket.ticket_id, customer = %ticket.customer_id, "ticket opened");
        self.tickets.write().await.push(ticket.clone());
        Ok(ticket)
    }

    /// Tickets opened so far, oldest first.
    pub async fn tickets(&self) -> Vec<Ticket> {
        self.tickets.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::Priority;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn minutes_ago(minutes: i64) -> chrono::DateTime<Utc> {
        Utc::now() - chrono::Duration::minutes(minutes)
    }

    fn customer(id: &str) -> Customer {
        Customer::new(id, format!("Customer {id}"), format!("{id}@example.com")).unwrap()
    }

    #[tokio::test]
    async fn seeded_store_has_demo_customers() {
        let store = CustomerStore::seeded();
        let alice = store.get("12345").await.unwrap();
        assert_eq!(alice.name, "Alice Johnson");
        assert_eq!(alice.email, "alice@example.com");
        assert!(store.get("99999").await.is_none());
    }

    #[tokio::test]
    async fn recent_orders_by_last_interaction() {
        let store = CustomerStore::new();
        store.insert(customer("never-1")).await.unwrap();
        store
            .insert(customer("old").with_last_interaction(minutes_ago(60)))
            .await
            .unwrap();
        store.insert(customer("never-2")).await.unwrap();
        store
            .insert(customer("new").with_last_interaction(minutes_ago(1)))
            .await
            .unwrap();

        let ids: Vec<_> = store.recent(10).await.into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["new", "old", "never-1", "never-2"]);

        let ids: Vec<_> = store.recent(1).await.into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["new"]);

        assert!(store.recent(0).await.is_empty());
    }

    #[tokio::test]
    async fn ties_keep_insertion_order() {
        let at = minutes_ago(5);
        let store = CustomerStore::new();
        for id in ["a", "b", "c"] {
            store
                .insert(customer(id).with_last_interaction(at))
                .await
                .unwrap();
        }
        let ids: Vec<_> = store.recent(3).await.into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = CustomerStore::new();
        store.insert(customer("1")).await.unwrap();
        let err = store.insert(customer("1")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn ticket_for_known_customer() {
        let store = CustomerStore::seeded();
        let request = TicketRequest::new("12345", "Billing Issue", "I was charged twice")
            .with_priority("high");

        let ticket = store.create_ticket(request).await.unwrap();
        assert_eq!(ticket.customer_id, "12345");
        assert_eq!(ticket.subject, "Billing Issue");
        assert_eq!(ticket.priority, Priority::High);
        assert_eq!(ticket.status, TicketStatus::Open);
        assert!(ticket.ticket_id.starts_with("TICKET-"));
        assert_eq!(store.tickets().await.len(), 1);
    }

    #[tokio::test]
    async fn ticket_for_unknown_customer_is_domain_error() {
        let store = CustomerStore::seeded();
        let err = store
            .create_ticket(TicketRequest::new("00000", "Help", "Anything"))
            .await
            .unwrap_err();
        assert_eq!(err, Error::Domain("Customer 00000 not found".into()));
        assert!(store.tickets().await.is_empty());
    }

    #[tokio::test]
    async fn bad_priority_is_validation_error() {
        let store = CustomerStore::seeded();
        let err = store
            .create_ticket(TicketRequest::new("12345", "Help", "Anything").with_priority("High"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn concurrent_tickets_get_distinct_ids() {
        let store = Arc::new(CustomerStore::seeded());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let request = TicketRequest::new("12345", format!("Issue {i}"), "Burst");
                store.create_ticket(request).await.unwrap().ticket_id
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            assert!(ids.insert(handle.await.unwrap()));
        }
        assert_eq!(ids.len(), 32);
    }
}
