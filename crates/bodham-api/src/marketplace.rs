use bodham_gateway::Gateway;
use bodham_sync::{CollectionStore, MutationController, MutationKind, Position};
use bodham_types::api::ProductRequest;
use bodham_types::models::Product;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::session::{Session, non_blank};

/// The public storefront. Only active listings are kept.
pub struct MarketplaceService {
    gateway: Gateway,
    session: Session,
    products: CollectionStore<Product>,
}

impl MarketplaceService {
    pub fn new(gateway: Gateway, session: Session) -> Self {
        Self {
            gateway,
            session,
            products: CollectionStore::new(),
        }
    }

    pub fn store(&self) -> &CollectionStore<Product> {
        &self.products
    }

    pub fn products(&self) -> Vec<Product> {
        self.products.items()
    }

    pub async fn refresh(&self) -> Result<usize, ApiError> {
        let fetch = async {
            let products: Vec<Product> = self.gateway.get("marketplace", &[]).await?;
            Ok::<_, ApiError>(products.into_iter().filter(Product::is_listed).collect())
        };
        let len = self.products.refresh(fetch).await?;
        debug!(viewer = self.session.user_id(), len, "marketplace refreshed");
        Ok(len)
    }

    /// Distinct categories of the current listings, sorted.
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self
            .products
            .items()
            .into_iter()
            .filter_map(|p| p.category)
            .filter(|c| !c.trim().is_empty())
            .collect();
        categories.sort_unstable();
        categories.dedup();
        categories
    }

    /// Client-side catalogue filter. `None` (or "All") means every category;
    /// the text query matches title or description, ignoring case.
    pub fn browse(&self, category: Option<&str>, query: &str) -> Vec<Product> {
        let category = category
            .map(str::trim)
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("all"));
        let needle = query.trim().to_lowercase();
        self.products
            .filtered(|p| in_category(p, category) && matches_text(p, &needle))
    }
}

fn in_category(product: &Product, category: Option<&str>) -> bool {
    match category {
        None => true,
        Some(wanted) => product
            .category
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(wanted)),
    }
}

fn matches_text(product: &Product, needle: &str) -> bool {
    needle.is_empty()
        || product.title.to_lowercase().contains(needle)
        || product.description.to_lowercase().contains(needle)
}

/// A seller's own catalogue.
pub struct SellerService {
    gateway: Gateway,
    session: Session,
    products: MutationController<Product>,
}

impl SellerService {
    pub fn new(gateway: Gateway, session: Session) -> Self {
        Self {
            gateway,
            session,
            products: MutationController::new(CollectionStore::new()),
        }
    }

    pub fn store(&self) -> &CollectionStore<Product> {
        self.products.store()
    }

    pub fn products(&self) -> Vec<Product> {
        self.store().items()
    }

    fn seller(&self) -> [(&str, &str); 1] {
        [("seller_id", self.session.user_id())]
    }

    pub async fn refresh(&self) -> Result<usize, ApiError> {
        let seller = self.seller();
        Ok(self
            .store()
            .refresh(self.gateway.get::<Vec<Product>>("sellers/products", &seller))
            .await?)
    }

    pub async fn add(&self, product: ProductRequest) -> Result<Product, ApiError> {
        self.session.require_seller()?;
        validate(&product)?;
        let seller = self.seller();
        let created = self
            .products
            .insert_confirmed(
                self.gateway.post("sellers/products", &seller, &product),
                Position::Front,
                |_| true,
            )
            .await?;
        info!(product_id = %created.id, "product listed");
        Ok(created)
    }

    pub async fn update(&self, id: &str, product: ProductRequest) -> Result<Product, ApiError> {
        validate(&product)?;
        let path = format!("sellers/products/{id}");
        let seller = self.seller();
        let edit = |current: &mut Product| {
            current.title = product.title.clone();
            current.description = product.description.clone();
            current.price = product.price;
            current.stock = product.stock;
            current.images = product.images.clone();
            current.category = product.category.clone();
        };
        let revert = |current: &mut Product, before: &Product| {
            current.title = before.title.clone();
            current.description = before.description.clone();
            current.price = before.price;
            current.stock = before.stock;
            current.images = before.images.clone();
            current.category = before.category.clone();
        };
        let confirm = async {
            self.gateway
                .put::<_, Product>(&path, &seller, &product)
                .await
                .map(Some)
        };
        Ok(self.products.apply(id, MutationKind::Update, edit, revert, confirm).await?)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let path = format!("sellers/products/{id}");
        let seller = self.seller();
        self.products
            .remove(id, MutationKind::Delete, self.gateway.delete(&path, &seller))
            .await?;
        info!(product_id = id, "product removed");
        Ok(())
    }
}

fn validate(product: &ProductRequest) -> Result<(), ApiError> {
    non_blank(&product.title, "Product title")?;
    if !product.price.is_finite() || product.price < 0.0 {
        return Err(ApiError::invalid("Price must be a non-negative amount"));
    }
    Ok(())
}
