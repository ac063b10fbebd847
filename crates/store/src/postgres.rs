use async_trait::async_trait;
use chrono::Utc;
use common::{ProductId, SaleId, SaleItemId, UserId};
use domain::{Money, NewProduct, NewSaleItem, Product, Sale, SaleItem};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{SaleStore, StoreTx},
};

/// PostgreSQL-backed persistence store.
///
/// The `FOR UPDATE` read in [`PostgresTx::product_for_update`] makes the
/// database serialize concurrent sale transactions that touch the same
/// product row, which is what keeps stock from being oversubscribed when
/// several server processes share one database.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            sku: row.try_get("sku")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock_quantity: row.try_get::<i32, _>("stock_quantity")? as u32,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_sale_item(row: PgRow) -> Result<SaleItem> {
        Ok(SaleItem {
            id: SaleItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            sale_id: SaleId::from_uuid(row.try_get::<Uuid, _>("sale_id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            quantity: row.try_get::<i32, _>("quantity")? as u32,
            price: Money::from_cents(row.try_get("price_cents")?),
        })
    }
}

#[async_trait]
impl SaleStore for PostgresStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<PostgresTx> {
        Ok(PostgresTx {
            tx: self.pool.begin().await?,
        })
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, sku, price_cents, stock_quantity, created_at, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn insert_product(&self, new_product: NewProduct) -> Result<Product> {
        let product = Product {
            id: ProductId::new(),
            name: new_product.name,
            sku: new_product.sku,
            price: new_product.price,
            stock_quantity: new_product.stock_quantity,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO products (id, name, sku, price_cents, stock_quantity, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.sku)
        .bind(product.price.cents())
        .bind(product.stock_quantity as i32)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("products_sku_unique")
            {
                return StoreError::DuplicateSku(product.sku.clone());
            }
            StoreError::Database(e)
        })?;

        Ok(product)
    }

    async fn get_sale(&self, id: SaleId) -> Result<Option<Sale>> {
        let sale_row = sqlx::query(
            "SELECT id, user_id, total_cents, created_at FROM sales WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(sale_row) = sale_row else {
            return Ok(None);
        };

        let item_rows = sqlx::query(
            "SELECT id, sale_id, product_id, quantity, price_cents FROM sale_items WHERE sale_id = $1",
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let items = item_rows
            .into_iter()
            .map(Self::row_to_sale_item)
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Sale {
            id: SaleId::from_uuid(sale_row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(sale_row.try_get::<Uuid, _>("user_id")?),
            total: Money::from_cents(sale_row.try_get("total_cents")?),
            created_at: sale_row.try_get("created_at")?,
            items,
        }))
    }
}

/// A PostgreSQL unit of work.
///
/// Dropping the transaction without committing rolls it back.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn product_for_update(&mut self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, sku, price_cents, stock_quantity, created_at, updated_at
            FROM products
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(PostgresStore::row_to_product).transpose()
    }

    async fn decrement_stock(&mut self, id: ProductId, quantity: u32) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock_quantity = stock_quantity - $2, updated_at = $3
            WHERE id = $1 AND stock_quantity >= $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(quantity as i32)
        .bind(Utc::now())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ConcurrencyConflict { product_id: id });
        }

        Ok(())
    }

    async fn insert_sale(
        &mut self,
        user_id: UserId,
        total: Money,
        items: Vec<NewSaleItem>,
    ) -> Result<Sale> {
        let sale_id = SaleId::new();
        let created_at = Utc::now();

        sqlx::query("INSERT INTO sales (id, user_id, total_cents, created_at) VALUES ($1, $2, $3, $4)")
            .bind(sale_id.as_uuid())
            .bind(user_id.as_uuid())
            .bind(total.cents())
            .bind(created_at)
            .execute(&mut *self.tx)
            .await?;

        let mut resolved = Vec::with_capacity(items.len());
        for item in items {
            let sale_item = SaleItem {
                id: SaleItemId::new(),
                sale_id,
                product_id: item.product_id,
                quantity: item.quantity,
                price: item.price,
            };

            sqlx::query(
                r#"
                INSERT INTO sale_items (id, sale_id, product_id, quantity, price_cents)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(sale_item.id.as_uuid())
            .bind(sale_id.as_uuid())
            .bind(sale_item.product_id.as_uuid())
            .bind(sale_item.quantity as i32)
            .bind(sale_item.price.cents())
            .execute(&mut *self.tx)
            .await?;

            resolved.push(sale_item);
        }

        Ok(Sale {
            id: sale_id,
            user_id,
            total,
            created_at,
            items: resolved,
        })
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
