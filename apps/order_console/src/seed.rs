use anyhow::Result;
use order_sync::{InMemoryOrderBackend, OrderMutations};
use order_types::domain::{OrderId, OrderStatus, PricebookEntryId};

const PRODUCTS: [(&str, &str, i64); 12] = [
    ("01u0001", "Laptop Pro 14", 189_900),
    ("01u0002", "Laptop Air 13", 119_900),
    ("01u0003", "USB-C Dock", 18_900),
    ("01u0004", "27in Monitor", 32_900),
    ("01u0005", "Wireless Mouse", 4_900),
    ("01u0006", "Mechanical Keyboard", 12_900),
    ("01u0007", "Noise Cancelling Headset", 24_900),
    ("01u0008", "Webcam HD", 8_900),
    ("01u0009", "Laptop Sleeve", 3_900),
    ("01u0010", "Extended Warranty", 29_900),
    ("01u0011", "Onsite Setup", 15_000),
    ("01u0012", "Cable Kit", 1_900),
];

const INITIAL_LINES: [&str; 2] = ["01u0001", "01u0005"];

/// A draft order with two lines, over a twelve-product price book.
pub async fn seeded_backend(order_id: &OrderId) -> Result<InMemoryOrderBackend> {
    let backend = PRODUCTS
        .iter()
        .fold(InMemoryOrderBackend::new(), |backend, (id, name, cents)| {
            backend.with_product(id, name, *cents)
        })
        .with_order(order_id, OrderStatus::Draft);

    for id in INITIAL_LINES {
        backend
            .add_line(order_id, &PricebookEntryId::new(id))
            .await?;
    }
    Ok(backend)
}
