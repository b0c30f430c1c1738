//! Order inspection and seeding.

use anyhow::Context;
use chrono::Utc;
use clap::{ArgGroup, Subcommand};
use glowcart_core::{InitialCorrelation, NewOrder};
use glowcart_db::{OrderStore, PgOrderStore};
use uuid::Uuid;

#[derive(Debug, Subcommand)]
pub enum OrderCommands {
    /// Print an order as JSON
    Show { id: Uuid },
    /// Create a pending order correlated to one provider identifier
    #[command(group(
        ArgGroup::new("correlation")
            .required(true)
            .args(["source_id", "payment_id", "checkout_session_id"])
    ))]
    Create {
        /// Total in centavos
        #[arg(long)]
        amount: i64,
        #[arg(long, default_value = "PHP")]
        currency: String,
        #[arg(long)]
        source_id: Option<String>,
        #[arg(long)]
        payment_id: Option<String>,
        #[arg(long)]
        checkout_session_id: Option<String>,
    },
}

/// Picks the single correlation id given on the command line.
pub(crate) fn initial_correlation(
    source_id: Option<String>,
    payment_id: Option<String>,
    checkout_session_id: Option<String>,
) -> anyhow::Result<InitialCorrelation> {
    match (source_id, payment_id, checkout_session_id) {
        (Some(id), None, None) => Ok(InitialCorrelation::Source(id)),
        (None, Some(id), None) => Ok(InitialCorrelation::Payment(id)),
        (None, None, Some(id)) => Ok(InitialCorrelation::CheckoutSession(id)),
        _ => anyhow::bail!(
            "exactly one of --source-id, --payment-id or --checkout-session-id is required"
        ),
    }
}

pub(crate) async fn run_order_command(
    pool: sqlx::PgPool,
    command: OrderCommands,
) -> anyhow::Result<()> {
    let store = PgOrderStore::new(pool);
    match command {
        OrderCommands::Show { id } => {
            let order = store
                .get(id)
                .await?
                .with_context(|| format!("order {id} not found"))?;
            println!("{}", serde_json::to_string_pretty(&order)?);
        }
        OrderCommands::Create {
            amount,
            currency,
            source_id,
            payment_id,
            checkout_session_id,
        } => {
            let correlation = initial_correlation(source_id, payment_id, checkout_session_id)?;
            let order = NewOrder {
                amount,
                currency,
                correlation,
            }
            .into_order(Utc::now())?;
            store.insert(&order).await?;
            tracing::info!(order_id = %order.id, "order created");
            println!("{}", order.id);
        }
    }
    Ok(())
}
