use std::path::Path;

use anyhow::Context;
use market_types::domain::catalog::CatalogSeed;
use market_types::ports::repository::CatalogRepository;

/// Inserts a catalog seed. Rules are validated before anything is written.
pub async fn load<R: CatalogRepository>(repo: &R, seed: CatalogSeed) -> anyhow::Result<()> {
    for rule in &seed.rules {
        rule.validate()
            .with_context(|| format!("invalid delivery fee rule {}", rule.id))?;
    }

    let counts = (
        seed.addresses.len(),
        seed.stores.len(),
        seed.products.len(),
        seed.drivers.len(),
        seed.rules.len(),
    );
    for address in seed.addresses {
        repo.insert_address(address).await?;
    }
    for store in seed.stores {
        repo.insert_store(store).await?;
    }
    for product in seed.products {
        repo.insert_product(product).await?;
    }
    for variant in seed.variants {
        repo.insert_variant(variant).await?;
    }
    for driver in seed.drivers {
        repo.insert_driver(driver).await?;
    }
    for rule in seed.rules {
        repo.insert_rule(rule).await?;
    }
    tracing::info!(
        addresses = counts.0,
        stores = counts.1,
        products = counts.2,
        drivers = counts.3,
        rules = counts.4,
        "catalog seeded"
    );
    Ok(())
}

pub async fn load_file<R: CatalogRepository>(repo: &R, path: impl AsRef<Path>) -> anyhow::Result<()> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading seed file {}", path.display()))?;
    let seed: CatalogSeed = serde_json::from_str(&raw)
        .with_context(|| format!("parsing seed file {}", path.display()))?;
    load(repo, seed).await
}
