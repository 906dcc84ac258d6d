//! Stripe customer management

use sqlx::PgPool;
use stripe::{CreateCustomer, Customer, ListCustomers};

use crate::client::StripeClient;
use crate::error::BillingResult;

/// Customer service for linking companies to Stripe customers
pub struct CustomerService {
    stripe: StripeClient,
    pool: PgPool,
}

impl CustomerService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// Find or create the Stripe customer for a registration email.
    ///
    /// Checks our own `companies` table first so a re-registration reuses the
    /// customer recorded at the previous checkout, then falls back to a
    /// Stripe-side lookup before creating a new customer.
    pub async fn find_or_create(&self, company_name: &str, email: &str) -> BillingResult<Customer> {
        // Re-registration: reuse the customer already linked to this email
        let existing: Option<(Option<String>,)> =
            sqlx::query_as("SELECT stripe_customer_id FROM companies WHERE email = $1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        if let Some((Some(customer_id),)) = existing {
            if let Ok(id) = customer_id.parse::<stripe::CustomerId>() {
                match Customer::retrieve(self.stripe.inner(), &id, &[]).await {
                    Ok(customer) => {
                        tracing::info!(
                            email = %email,
                            customer_id = %customer.id,
                            "Reusing Stripe customer from companies table"
                        );
                        return Ok(customer);
                    }
                    Err(e) => {
                        tracing::warn!(
                            email = %email,
                            customer_id = %customer_id,
                            error = %e,
                            "Recorded Stripe customer no longer retrievable, creating new"
                        );
                    }
                }
            }
        }

        // Stripe-side lookup by email catches customers created by a checkout
        // whose completion webhook never arrived
        let list = Customer::list(
            self.stripe.inner(),
            &ListCustomers {
                email: Some(email),
                limit: Some(1),
                ..Default::default()
            },
        )
        .await?;

        if let Some(customer) = list.data.into_iter().next() {
            tracing::info!(
                email = %email,
                customer_id = %customer.id,
                "Reusing Stripe customer found by email"
            );
            return Ok(customer);
        }

        let customer = Customer::create(
            self.stripe.inner(),
            CreateCustomer {
                name: Some(company_name),
                email: Some(email),
                ..Default::default()
            },
        )
        .await?;

        tracing::info!(
            email = %email,
            customer_id = %customer.id,
            "Created Stripe customer"
        );

        Ok(customer)
    }
}
