use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Local, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{
        category::{Column as CategoryColumn, Entity as CategoryEntity},
        order::{self, Column as OrderColumn, Entity as OrderEntity, OrderStatus},
        order_item::{self, Column as OrderItemColumn, Entity as OrderItemEntity},
        product::{Column as ProductColumn, Entity as ProductEntity},
        user::{Column as UserColumn, Entity as UserEntity},
    },
    errors::ServiceError,
};

pub mod window;

pub use window::{BucketGranularity, ReportingWindow, Timeframe};

/// Flat margin heuristic applied to order revenue. True cost of goods is not
/// captured at checkout, so reported profit is an estimate, not a ledger
/// value.
pub const ESTIMATED_PROFIT_MARGIN: Decimal = dec!(0.3);

/// Best-seller rows returned when the caller does not ask for a count.
pub const DEFAULT_TOP_SELLER_LIMIT: usize = 5;

/// One bucket of the revenue/profit time series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesPoint {
    pub bucket_key: String,
    pub revenue: Decimal,
    pub profit: Decimal,
}

/// Ranked product row for the best-sellers table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopSellerRow {
    pub product_id: Uuid,
    pub name: String,
    pub image: String,
    pub sold: i64,
    pub revenue: Decimal,
    pub category: String,
}

/// Revenue per category as the parallel arrays the dashboard charts expect.
/// Label order is whatever the grouping produced; callers must not rely on
/// it being sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategorySales {
    pub labels: Vec<String>,
    pub data: Vec<Decimal>,
}

/// Everything the admin dashboard landing page renders in one payload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_users: u64,
    pub total_orders: u64,
    pub total_revenue: Decimal,
    pub new_users_this_month: u64,
    pub best_selling_products: Vec<TopSellerRow>,
    pub category_sales: CategorySales,
}

/// Sales-analytics aggregations over the order store. Every call recomputes
/// from the live collections; nothing is cached between requests.
#[derive(Clone)]
pub struct AnalyticsService {
    db: Arc<DatabaseConnection>,
}

impl AnalyticsService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Revenue/profit time series over the resolved window, ascending by
    /// bucket key.
    pub async fn revenue_series(
        &self,
        window: &ReportingWindow,
    ) -> Result<Vec<TimeSeriesPoint>, ServiceError> {
        let db = &*self.db;

        let mut query = OrderEntity::find()
            .filter(OrderColumn::CurrentStatus.is_in(window.statuses.iter().copied()))
            .filter(OrderColumn::CreatedAt.gte(window.start));
        if let Some(end) = window.end {
            query = query.filter(OrderColumn::CreatedAt.lte(end));
        }

        let orders = query.order_by_asc(OrderColumn::CreatedAt).all(db).await?;

        Ok(bucket_series(&orders, window.granularity))
    }

    /// Best-selling products across all non-cancelled orders, descending by
    /// units sold, at most `limit` rows. Products or categories that have
    /// been deleted since the sale drop out of the result.
    pub async fn top_sellers(&self, limit: usize) -> Result<Vec<TopSellerRow>, ServiceError> {
        let items = self.non_cancelled_line_items().await?;

        let ranked = rank_sellers(&items, limit);
        if ranked.is_empty() {
            return Ok(Vec::new());
        }

        let product_ids = ranked.iter().map(|(id, _)| *id).collect();
        let category_by_product = self.category_by_product(product_ids).await?;

        Ok(ranked
            .into_iter()
            .filter_map(|(product_id, totals)| {
                category_by_product.get(&product_id).map(|category| TopSellerRow {
                    product_id,
                    name: totals.name,
                    image: totals.image,
                    sold: totals.sold,
                    revenue: totals.revenue,
                    category: category.clone(),
                })
            })
            .collect())
    }

    /// Revenue per category across all non-cancelled orders. Line items
    /// whose product or category no longer exists are excluded.
    pub async fn category_sales(&self) -> Result<CategorySales, ServiceError> {
        let items = self.non_cancelled_line_items().await?;

        let product_ids: Vec<Uuid> = items
            .iter()
            .map(|item| item.product_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let category_by_product = self.category_by_product(product_ids).await?;

        Ok(sum_category_revenue(&items, &category_by_product))
    }

    /// Aggregate payload for the dashboard landing page. The independent
    /// sub-queries fan out concurrently; any failure fails the whole
    /// request, never a partial summary.
    pub async fn dashboard_summary(&self) -> Result<DashboardSummary, ServiceError> {
        info!("Generating dashboard summary");
        let db = &*self.db;
        let month_start = start_of_current_month();

        let (total_users, new_users_this_month, total_orders, revenue_orders) = tokio::try_join!(
            UserEntity::find().count(db),
            UserEntity::find()
                .filter(UserColumn::CreatedAt.gte(month_start))
                .count(db),
            OrderEntity::find().count(db),
            OrderEntity::find()
                .filter(OrderColumn::CurrentStatus.ne(OrderStatus::Cancelled))
                .all(db),
        )?;

        let total_revenue: Decimal = revenue_orders.iter().map(|o| o.final_total).sum();

        let (best_selling_products, category_sales) = tokio::try_join!(
            self.top_sellers(DEFAULT_TOP_SELLER_LIMIT),
            self.category_sales(),
        )?;

        Ok(DashboardSummary {
            total_users,
            total_orders,
            total_revenue,
            new_users_this_month,
            best_selling_products,
            category_sales,
        })
    }

    /// Line items belonging to any order that is not cancelled, in stable
    /// chronological order so first-seen snapshot fields are deterministic.
    async fn non_cancelled_line_items(&self) -> Result<Vec<order_item::Model>, ServiceError> {
        let db = &*self.db;

        let order_ids: Vec<Uuid> = OrderEntity::find()
            .filter(OrderColumn::CurrentStatus.ne(OrderStatus::Cancelled))
            .all(db)
            .await?
            .into_iter()
            .map(|o| o.id)
            .collect();

        if order_ids.is_empty() {
            return Ok(Vec::new());
        }

        let items = OrderItemEntity::find()
            .filter(OrderItemColumn::OrderId.is_in(order_ids))
            .order_by_asc(OrderItemColumn::CreatedAt)
            .all(db)
            .await?;

        Ok(items)
    }

    /// Maps each still-existing product id to its category name. Products
    /// pointing at a deleted category are omitted, giving the inner-join
    /// semantics the breakdowns rely on.
    async fn category_by_product(
        &self,
        product_ids: Vec<Uuid>,
    ) -> Result<HashMap<Uuid, String>, ServiceError> {
        if product_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let db = &*self.db;

        let products = ProductEntity::find()
            .filter(ProductColumn::Id.is_in(product_ids))
            .all(db)
            .await?;

        let category_ids: Vec<Uuid> = products.iter().map(|p| p.category_id).collect();
        let category_names: HashMap<Uuid, String> = CategoryEntity::find()
            .filter(CategoryColumn::Id.is_in(category_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        Ok(products
            .into_iter()
            .filter_map(|p| {
                category_names
                    .get(&p.category_id)
                    .map(|name| (p.id, name.clone()))
            })
            .collect())
    }
}

/// First calendar day of the current month in server local time.
fn start_of_current_month() -> DateTime<Utc> {
    let first_midnight = Local::now()
        .date_naive()
        .with_day(1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();

    first_midnight
        .and_local_timezone(Local)
        .earliest()
        .map(|at| at.with_timezone(&Utc))
        .unwrap_or_else(|| first_midnight.and_utc())
}

/// Groups orders into buckets, summing revenue and the per-order profit
/// estimate. Profit is computed per order before summation, not recomputed
/// on the bucket total.
fn bucket_series(orders: &[order::Model], granularity: BucketGranularity) -> Vec<TimeSeriesPoint> {
    let mut buckets: HashMap<String, (Decimal, Decimal)> = HashMap::new();

    for order in orders {
        let profit = order.final_total * ESTIMATED_PROFIT_MARGIN;
        let entry = buckets
            .entry(granularity.bucket_key(order.created_at))
            .or_insert((Decimal::ZERO, Decimal::ZERO));
        entry.0 += order.final_total;
        entry.1 += profit;
    }

    let mut series: Vec<TimeSeriesPoint> = buckets
        .into_iter()
        .map(|(bucket_key, (revenue, profit))| TimeSeriesPoint {
            bucket_key,
            revenue,
            profit,
        })
        .collect();
    series.sort_by(|a, b| a.bucket_key.cmp(&b.bucket_key));
    series
}

struct SellerTotals {
    name: String,
    image: String,
    sold: i64,
    revenue: Decimal,
}

/// Groups line items by product, keeping the first-seen snapshot fields,
/// then ranks by units sold. The sort is stable, so products tied on `sold`
/// stay in first-seen order.
fn rank_sellers(items: &[order_item::Model], limit: usize) -> Vec<(Uuid, SellerTotals)> {
    let mut first_seen: Vec<Uuid> = Vec::new();
    let mut totals: HashMap<Uuid, SellerTotals> = HashMap::new();

    for item in items {
        let entry = totals.entry(item.product_id).or_insert_with(|| {
            first_seen.push(item.product_id);
            SellerTotals {
                name: item.name.clone(),
                image: item.image.clone(),
                sold: 0,
                revenue: Decimal::ZERO,
            }
        });
        entry.sold += i64::from(item.quantity);
        entry.revenue += item.unit_price * Decimal::from(item.quantity);
    }

    let mut ranked: Vec<(Uuid, SellerTotals)> = first_seen
        .into_iter()
        .filter_map(|id| totals.remove(&id).map(|t| (id, t)))
        .collect();
    ranked.sort_by(|a, b| b.1.sold.cmp(&a.1.sold));
    ranked.truncate(limit);
    ranked
}

/// Sums line revenue per category name, preserving first-seen label order.
/// Items missing from the product-to-category map are skipped.
fn sum_category_revenue(
    items: &[order_item::Model],
    category_by_product: &HashMap<Uuid, String>,
) -> CategorySales {
    let mut labels: Vec<String> = Vec::new();
    let mut data: Vec<Decimal> = Vec::new();
    let mut slot_by_label: HashMap<String, usize> = HashMap::new();

    for item in items {
        let Some(category) = category_by_product.get(&item.product_id) else {
            continue;
        };
        let line_revenue = item.unit_price * Decimal::from(item.quantity);

        match slot_by_label.get(category) {
            Some(&slot) => data[slot] += line_revenue,
            None => {
                slot_by_label.insert(category.clone(), labels.len());
                labels.push(category.clone());
                data.push(line_revenue);
            }
        }
    }

    CategorySales { labels, data }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_utc()
    }

    fn delivered_order(total: i64, created_at: DateTime<Utc>) -> order::Model {
        order::Model {
            id: Uuid::new_v4(),
            order_number: format!("SO-{}", total),
            customer_id: Uuid::new_v4(),
            current_status: OrderStatus::Delivered,
            final_total: Decimal::from(total),
            currency: "VND".to_string(),
            notes: None,
            created_at,
            updated_at: None,
        }
    }

    fn line_item(
        product_id: Uuid,
        name: &str,
        quantity: i32,
        unit_price: i64,
        created_at: DateTime<Utc>,
    ) -> order_item::Model {
        order_item::Model {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            product_id,
            name: name.to_string(),
            image: format!("{name}.jpg"),
            variant_name: "default".to_string(),
            unit_price: Decimal::from(unit_price),
            quantity,
            created_at,
        }
    }

    #[test]
    fn same_day_orders_share_a_bucket() {
        let at = day(2024, 5, 17);
        let orders = vec![delivered_order(100_000, at), delivered_order(200_000, at)];

        let series = bucket_series(&orders, BucketGranularity::Day);

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].bucket_key, "2024-05-17");
        assert_eq!(series[0].revenue, Decimal::from(300_000));
        assert_eq!(series[0].profit, Decimal::from(90_000));
    }

    #[test]
    fn month_buckets_sort_ascending() {
        let orders = vec![
            delivered_order(30, day(2024, 3, 1)),
            delivered_order(10, day(2024, 1, 20)),
            delivered_order(20, day(2024, 1, 5)),
        ];

        let series = bucket_series(&orders, BucketGranularity::Month);

        let keys: Vec<&str> = series.iter().map(|p| p.bucket_key.as_str()).collect();
        assert_eq!(keys, vec!["2024-01", "2024-03"]);
        assert_eq!(series[0].revenue, Decimal::from(30));
    }

    #[test]
    fn rank_sellers_keeps_first_seen_snapshot_and_sums() {
        let shirt = Uuid::new_v4();
        let mug = Uuid::new_v4();
        let items = vec![
            line_item(shirt, "Shirt v1", 2, 100, day(2024, 1, 1)),
            line_item(mug, "Mug", 3, 50, day(2024, 1, 2)),
            line_item(shirt, "Shirt v2 renamed", 4, 120, day(2024, 1, 3)),
        ];

        let ranked = rank_sellers(&items, 5);

        assert_eq!(ranked.len(), 2);
        let (top_id, top) = &ranked[0];
        assert_eq!(*top_id, shirt);
        assert_eq!(top.name, "Shirt v1");
        assert_eq!(top.image, "Shirt v1.jpg");
        assert_eq!(top.sold, 6);
        assert_eq!(top.revenue, Decimal::from(2 * 100 + 4 * 120));
        assert_eq!(ranked[1].1.sold, 3);
    }

    #[test]
    fn rank_sellers_breaks_ties_by_first_seen_and_truncates() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let third = Uuid::new_v4();
        let items = vec![
            line_item(first, "a", 2, 10, day(2024, 1, 1)),
            line_item(second, "b", 2, 10, day(2024, 1, 2)),
            line_item(third, "c", 1, 10, day(2024, 1, 3)),
        ];

        let ranked = rank_sellers(&items, 2);

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, first);
        assert_eq!(ranked[1].0, second);
    }

    #[test]
    fn category_revenue_skips_unresolvable_products() {
        let known = Uuid::new_v4();
        let deleted = Uuid::new_v4();
        let mut category_by_product = HashMap::new();
        category_by_product.insert(known, "Tees".to_string());

        let items = vec![
            line_item(known, "a", 2, 100, day(2024, 1, 1)),
            line_item(deleted, "b", 9, 999, day(2024, 1, 2)),
            line_item(known, "c", 1, 40, day(2024, 1, 3)),
        ];

        let sales = sum_category_revenue(&items, &category_by_product);

        assert_eq!(sales.labels, vec!["Tees".to_string()]);
        assert_eq!(sales.data, vec![Decimal::from(240)]);
    }

    #[test]
    fn category_labels_follow_first_seen_order() {
        let shirt = Uuid::new_v4();
        let mug = Uuid::new_v4();
        let mut category_by_product = HashMap::new();
        category_by_product.insert(shirt, "Shirts".to_string());
        category_by_product.insert(mug, "Mugs".to_string());

        let items = vec![
            line_item(mug, "m", 1, 5, day(2024, 1, 1)),
            line_item(shirt, "s", 1, 7, day(2024, 1, 2)),
            line_item(mug, "m", 2, 5, day(2024, 1, 3)),
        ];

        let sales = sum_category_revenue(&items, &category_by_product);

        assert_eq!(sales.labels, vec!["Mugs".to_string(), "Shirts".to_string()]);
        assert_eq!(sales.data, vec![Decimal::from(15), Decimal::from(7)]);
    }

    proptest! {
        #[test]
        fn bucket_sums_round_trip_to_order_totals(
            specs in prop::collection::vec((0i64..365, 1i64..10_000_000), 0..64)
        ) {
            let base = day(2024, 1, 1);
            let orders: Vec<order::Model> = specs
                .iter()
                .map(|&(offset, total)| {
                    delivered_order(total, base + chrono::Duration::days(offset))
                })
                .collect();

            let series = bucket_series(&orders, BucketGranularity::Day);

            let bucketed: Decimal = series.iter().map(|p| p.revenue).sum();
            let direct: Decimal = orders.iter().map(|o| o.final_total).sum();
            prop_assert_eq!(bucketed, direct);

            for point in &series {
                prop_assert_eq!(point.profit, point.revenue * ESTIMATED_PROFIT_MARGIN);
            }

            for pair in series.windows(2) {
                prop_assert!(pair[0].bucket_key < pair[1].bucket_key);
            }
        }
    }
}
