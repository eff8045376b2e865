mod config;
mod seed;

use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use order_sync::{
    CatalogAction, GateState, OrderLineAction, OrderPage, PageServices, PaginationState,
    SortDirection, SortSpec, TracingNotificationSink, ViewController, ViewKind,
};
use order_types::domain::{OrderId, PricebookEntryId};
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Drive an order page against a seeded in-memory backend")]
struct Cli {
    /// Settings file; defaults to ./order_console.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    order_id: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct ViewArgs {
    #[arg(long)]
    sort: Option<String>,
    /// `asc` or `desc`; anything else sorts ascending.
    #[arg(long, default_value = "asc")]
    direction: String,
    #[arg(long, default_value_t = 1)]
    page: usize,
    #[arg(long)]
    page_size: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Products that can be added to the order.
    Catalog {
        #[arg(long)]
        search: Option<String>,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Lines already on the order.
    Lines {
        #[command(flatten)]
        view: ViewArgs,
    },
    Add {
        #[arg(long)]
        product: String,
    },
    /// Removes the line holding `product`.
    Remove {
        #[arg(long)]
        product: String,
    },
    Activate,
    /// Prints every catalog page in turn.
    Walk {
        #[arg(long)]
        page_size: Option<usize>,
    },
}

#[derive(Serialize)]
struct ViewReport<'a, R> {
    view: ViewKind,
    gate: GateState,
    pagination: PaginationState,
    total_pages: usize,
    sort: Option<SortSpec>,
    rows: &'a [R],
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = config::load_settings(cli.config.as_deref())?;
    if let Some(order_id) = cli.order_id {
        settings.order_id = order_id;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log)),
        )
        .with_writer(std::io::stderr)
        .init();

    let order_id = OrderId::new(settings.order_id.clone());
    let backend = Arc::new(seed::seeded_backend(&order_id).await?);
    let services = PageServices {
        catalog_query: backend.clone(),
        line_query: backend.clone(),
        mutations: backend,
        notifier: Arc::new(TracingNotificationSink),
    };
    let (page, report) = OrderPage::open(order_id, services, settings.view_settings()?).await;
    if let Some(err) = report.order_lines.as_ref().or(report.catalog.as_ref()) {
        warn!(error = %err, "order page opened with load failures");
    }

    run(&page, cli.command).await
}

async fn run(page: &OrderPage, command: Command) -> Result<()> {
    match command {
        Command::Catalog { search, view } => {
            if let Some(keyword) = search {
                page.catalog().on_search(&keyword).await?;
            }
            apply_view_args(page.catalog().as_ref(), &view)?;
            print_view(page.catalog().as_ref())
        }
        Command::Lines { view } => {
            apply_view_args(page.order_lines().as_ref(), &view)?;
            print_view(page.order_lines().as_ref())
        }
        Command::Add { product } => {
            let entry = PricebookEntryId::new(product);
            let row = page
                .catalog()
                .core()
                .cache()
                .current()
                .find(&entry)
                .cloned()
                .ok_or_else(|| anyhow!("product {entry} is not in the catalog"))?;
            page.catalog().on_row_action(CatalogAction::Add, &row).await?;
            print_page(page).await
        }
        Command::Remove { product } => {
            let entry = PricebookEntryId::new(product);
            let row = page
                .order_lines()
                .core()
                .cache()
                .current()
                .iter()
                .find(|row| row.pricebook_entry_id == entry)
                .cloned()
                .ok_or_else(|| anyhow!("product {entry} is not on the order"))?;
            page.order_lines()
                .on_row_action(OrderLineAction::Remove, &row)
                .await?;
            print_page(page).await
        }
        Command::Activate => {
            page.order_lines().on_activate().await?;
            print_page(page).await
        }
        Command::Walk { page_size } => {
            let catalog = page.catalog().as_ref();
            if let Some(size) = page_size {
                catalog.on_page_size_change(size)?;
            }
            loop {
                print_view(catalog)?;
                if !catalog.on_next_page() {
                    break;
                }
            }
            Ok(())
        }
    }
}

fn apply_view_args<C: ViewController>(controller: &C, args: &ViewArgs) -> Result<()> {
    if let Some(size) = args.page_size {
        controller.on_page_size_change(size)?;
    }
    if let Some(field) = &args.sort {
        controller.on_sort(field, SortDirection::parse(&args.direction));
    }
    controller.on_page_change(args.page);
    Ok(())
}

fn print_view<C>(controller: &C) -> Result<()>
where
    C: ViewController,
    C::Row: Serialize,
{
    let rows = controller.visible_rows();
    let pagination = controller.pagination_state();
    let report = ViewReport {
        view: controller.view(),
        gate: controller.gate_state(),
        pagination,
        total_pages: pagination.total_pages(),
        sort: controller.sort_spec(),
        rows: rows.rows(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn print_page(page: &OrderPage) -> Result<()> {
    page.settled().await;
    print_view(page.order_lines().as_ref())?;
    print_view(page.catalog().as_ref())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
