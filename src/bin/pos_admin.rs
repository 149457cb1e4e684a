//! Operator CLI: run migrations, create shops and load demo data.
//!
//! ```text
//! pos-admin migrate
//! pos-admin create-tenant --business "Corner Shop" --name Ama --email ama@shop.com --password ...
//! pos-admin seed-demo --email demo@shop.com
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use tracing::{debug, info};

use retail_pos_api::{
    config::{self, AppConfig},
    db::{self, DbPool},
    entities::transaction::PaymentMethod,
    events::{Event, EventSender},
    handlers::AppServices,
    auth::{AuthConfig, AuthService},
    services::{
        customers::CreateCustomerRequest,
        products::CreateProductRequest,
        sales::{CheckoutRequest, SaleLine},
        tenancy::{RegisterRequest, Session},
    },
};

#[derive(Parser)]
#[command(name = "pos-admin", about = "Administration for the retail POS backend", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Register a shop and its owner account
    CreateTenant(CreateTenantArgs),
    /// Register a demo shop with products, customers and a few sales
    SeedDemo(SeedDemoArgs),
}

#[derive(Args)]
struct CreateTenantArgs {
    #[arg(long, help = "Business name")]
    business: String,
    #[arg(long, help = "Owner's name")]
    name: String,
    #[arg(long, help = "Owner's email address")]
    email: String,
    #[arg(long, help = "Owner's password, at least 8 characters")]
    password: String,
    #[arg(long, help = "ISO 4217 currency code")]
    currency: Option<String>,
}

#[derive(Args)]
struct SeedDemoArgs {
    #[arg(long, default_value = "demo@retail-pos.local")]
    email: String,
    #[arg(long, default_value = "demo-password")]
    password: String,
}

struct AdminContext {
    config: AppConfig,
    db: Arc<DbPool>,
    services: AppServices,
}

impl AdminContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(&config.log_level, config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        let db = Arc::new(db_pool);

        let auth_service = Arc::new(AuthService::new(AuthConfig::new(
            config.jwt_secret.clone(),
            std::time::Duration::from_secs(config.jwt_expiration_secs),
        )));

        let (event_tx, mut event_rx) = mpsc::channel::<Event>(32);
        let event_sender = Arc::new(EventSender::new(event_tx));
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                debug!(target: "pos_admin", event = event.name(), "event");
            }
        });

        let services = AppServices::new(db.clone(), event_sender, auth_service, &config);
        Ok(Self {
            config,
            db,
            services,
        })
    }
}

fn print_session(session: &Session, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(session)?);
    } else {
        println!("tenant:  {} ({})", session.tenant.name, session.tenant.id);
        println!("owner:   {} <{}>", session.user.name, session.user.email);
        println!("token:   {}", session.tokens.access_token);
    }
    Ok(())
}

async fn seed_demo(ctx: &AdminContext, args: SeedDemoArgs, json: bool) -> Result<()> {
    let session = ctx
        .services
        .tenancy
        .register(RegisterRequest {
            name: "Demo Owner".to_string(),
            email: args.email,
            password: args.password,
            business_name: "Demo Corner Shop".to_string(),
            currency: Some(ctx.config.default_currency.clone()),
        })
        .await
        .context("failed to register demo shop")?;
    let tenant_id = session.tenant.id;
    let owner_id = session.user.id;

    let catalogue = [
        ("Rice 5kg", "RICE-5", dec!(12.50), dec!(9.00), 40),
        ("Cooking Oil 1L", "OIL-1", dec!(4.20), dec!(3.10), 25),
        ("Sugar 1kg", "SUGAR-1", dec!(1.80), dec!(1.20), 8),
        ("Tea Bags 100", "TEA-100", dec!(3.50), dec!(2.40), 30),
    ];
    let mut products = Vec::with_capacity(catalogue.len());
    for (name, sku, price, cost, stock) in catalogue {
        let product = ctx
            .services
            .products
            .create_product(
                tenant_id,
                owner_id,
                CreateProductRequest {
                    name: name.to_string(),
                    sku: sku.to_string(),
                    barcode: None,
                    category: Some("Groceries".to_string()),
                    description: None,
                    unit: Some("pcs".to_string()),
                    price,
                    cost_price: Some(cost),
                    initial_stock: Some(stock),
                    min_stock_level: Some(10),
                },
            )
            .await?;
        products.push(product);
    }

    let customer = ctx
        .services
        .customers
        .create_customer(
            tenant_id,
            CreateCustomerRequest {
                name: "Kofi Mensah".to_string(),
                phone: Some("+233200000000".to_string()),
                email: None,
                address: None,
                credit_limit: Some(dec!(100.00)),
                notes: None,
            },
        )
        .await?;

    ctx.services
        .sales
        .checkout(
            tenant_id,
            owner_id,
            CheckoutRequest {
                items: vec![SaleLine {
                    product_id: products[0].id,
                    quantity: 2,
                    discount: None,
                }],
                customer_id: None,
                payment_method: PaymentMethod::Cash,
                amount_paid: dec!(50.00),
                discount: None,
                tax_rate: None,
                notes: None,
            },
        )
        .await?;

    ctx.services
        .sales
        .checkout(
            tenant_id,
            owner_id,
            CheckoutRequest {
                items: vec![SaleLine {
                    product_id: products[1].id,
                    quantity: 3,
                    discount: None,
                }],
                customer_id: Some(customer.id),
                payment_method: PaymentMethod::Debt,
                amount_paid: dec!(5.00),
                discount: None,
                tax_rate: None,
                notes: Some("demo credit sale".to_string()),
            },
        )
        .await?;

    info!(%tenant_id, products = products.len(), "demo data loaded");
    print_session(&session, json)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let ctx = AdminContext::initialize().await?;

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(&ctx.db)
                .await
                .context("failed to run migrations")?;
            println!("migrations applied");
        }
        Commands::CreateTenant(args) => {
            let session = ctx
                .services
                .tenancy
                .register(RegisterRequest {
                    name: args.name,
                    email: args.email,
                    password: args.password,
                    business_name: args.business,
                    currency: args.currency,
                })
                .await
                .context("failed to register tenant")?;
            print_session(&session, cli.json)?;
        }
        Commands::SeedDemo(args) => {
            db::run_migrations(&ctx.db)
                .await
                .context("failed to run migrations")?;
            seed_demo(&ctx, args, cli.json).await?;
        }
    }

    Ok(())
}
