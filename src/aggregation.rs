//! Financial aggregation over orders and line items.
//!
//! Pure functions, no I/O. The archive run, the settlement report and the
//! accounting export all derive their figures here so the same orders
//! always produce the same totals. Sums are integer sums of [`Money`];
//! stored `total`/`subtotal`/`tax` values are used as-is and never
//! re-derived from line items or the tax rate.
//!
//! Grouped outputs keep first-encountered order among equal revenues: the
//! grouping preserves insertion order and the sort by revenue is stable.

use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, Timelike};
use serde::Serialize;

use crate::clock;
use crate::models::{AsOrder, LineItem, OrderWithItems, PaymentMethod};
use crate::money::Money;

pub const UNCATEGORIZED: &str = "Uncategorized";
pub const UNKNOWN_STAFF: &str = "Unknown";

/// Largest `|gross - (net + tax)|` still treated as balanced.
pub const BALANCE_TOLERANCE: Money = Money::from_cents(1);

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Keep orders created between the start of `start` and the end of `end`
/// (local time, inclusive). Orders with a missing or unparsable
/// `created_at` are dropped.
pub fn filter_by_date_range<T: AsOrder>(orders: Vec<T>, start: NaiveDate, end: NaiveDate) -> Vec<T> {
    orders
        .into_iter()
        .filter(|o| {
            o.as_order()
                .created_at
                .as_deref()
                .and_then(clock::local_date)
                .is_some_and(|day| day >= start && day <= end)
        })
        .collect()
}

/// Drop cancelled orders. Reports apply this; archival does not.
pub fn filter_excluding_cancelled<T: AsOrder>(orders: Vec<T>) -> Vec<T> {
    orders
        .into_iter()
        .filter(|o| !o.as_order().payment_status.is_cancelled())
        .collect()
}

// ---------------------------------------------------------------------------
// Payment and tax totals
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MethodTotal {
    pub count: u64,
    pub total: Money,
}

impl MethodTotal {
    fn add(&mut self, amount: Money) {
        self.count += 1;
        self.total += amount;
    }

    pub fn average(&self) -> Money {
        average_order_value(self.total, self.count)
    }
}

/// Order count and amount per payment method. `other` collects payment
/// modes outside Cash/Card/Online so they are visible, not lost.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentBreakdown {
    pub cash: MethodTotal,
    pub card: MethodTotal,
    pub online: MethodTotal,
    pub other: MethodTotal,
}

impl PaymentBreakdown {
    pub fn get(&self, method: &PaymentMethod) -> MethodTotal {
        match method {
            PaymentMethod::Cash => self.cash,
            PaymentMethod::Card => self.card,
            PaymentMethod::Online => self.online,
            PaymentMethod::Other(_) => self.other,
        }
    }

    pub fn total(&self) -> Money {
        self.cash.total + self.card.total + self.online.total + self.other.total
    }

    pub fn count(&self) -> u64 {
        self.cash.count + self.card.count + self.online.count + self.other.count
    }
}

pub fn sum_by_payment_method<T: AsOrder>(orders: &[T]) -> PaymentBreakdown {
    let mut breakdown = PaymentBreakdown::default();
    for order in orders.iter().map(AsOrder::as_order) {
        let bucket = match order.payment_method {
            PaymentMethod::Cash => &mut breakdown.cash,
            PaymentMethod::Card => &mut breakdown.card,
            PaymentMethod::Online => &mut breakdown.online,
            PaymentMethod::Other(_) => &mut breakdown.other,
        };
        bucket.add(order.total);
    }
    breakdown
}

/// Sums of the stored `tax`, `subtotal` and `total` fields.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxTotals {
    pub tax_collected: Money,
    pub net_sales: Money,
    pub gross_revenue: Money,
}

impl TaxTotals {
    /// `gross - (net + tax)`. Non-zero means some order's stored amounts
    /// disagree; reported, never corrected.
    pub fn drift(&self) -> Money {
        self.gross_revenue - (self.net_sales + self.tax_collected)
    }

    pub fn is_balanced(&self) -> bool {
        self.drift().abs() <= BALANCE_TOLERANCE
    }
}

pub fn tax_and_net_totals<T: AsOrder>(orders: &[T]) -> TaxTotals {
    let mut totals = TaxTotals::default();
    for order in orders.iter().map(AsOrder::as_order) {
        totals.tax_collected += order.tax;
        totals.net_sales += order.subtotal;
        totals.gross_revenue += order.total;
    }
    totals
}

/// `sum(total)` over the orders.
pub fn total_revenue<T: AsOrder>(orders: &[T]) -> Money {
    orders.iter().map(|o| o.as_order().total).sum()
}

/// Integer average rounded half away from zero; zero for no orders.
pub fn average_order_value(total: Money, count: u64) -> Money {
    total.div_round(count)
}

// ---------------------------------------------------------------------------
// Line item groupings
// ---------------------------------------------------------------------------

/// Insertion-ordered grouping by string key.
struct Grouped<V> {
    index: HashMap<String, usize>,
    groups: Vec<(String, V)>,
}

impl<V: Default> Grouped<V> {
    fn new() -> Self {
        Grouped {
            index: HashMap::new(),
            groups: Vec::new(),
        }
    }

    fn entry(&mut self, key: &str) -> &mut V {
        let idx = match self.index.get(key) {
            Some(&idx) => idx,
            None => {
                self.groups.push((key.to_string(), V::default()));
                self.index.insert(key.to_string(), self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        &mut self.groups[idx].1
    }

    fn into_groups(self) -> Vec<(String, V)> {
        self.groups
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct QtyRevenue {
    quantity: u64,
    revenue: Money,
}

/// All line items of a set of joined orders, in order.
pub fn line_items(orders: &[OrderWithItems]) -> impl Iterator<Item = &LineItem> {
    orders.iter().flat_map(|o| o.items.iter())
}

pub fn items_sold<'a>(items: impl IntoIterator<Item = &'a LineItem>) -> u64 {
    items.into_iter().map(|i| u64::from(i.quantity)).sum()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSales {
    pub name: String,
    pub quantity: u64,
    pub revenue: Money,
}

/// Best sellers by summed line total, grouped by the denormalized product
/// name, truncated to `limit`.
pub fn top_products_by_revenue<'a>(
    items: impl IntoIterator<Item = &'a LineItem>,
    limit: usize,
) -> Vec<ProductSales> {
    let mut grouped: Grouped<QtyRevenue> = Grouped::new();
    for item in items {
        let g = grouped.entry(&item.product_name);
        g.quantity += u64::from(item.quantity);
        g.revenue += item.total;
    }
    let mut products: Vec<ProductSales> = grouped
        .into_groups()
        .into_iter()
        .map(|(name, g)| ProductSales {
            name,
            quantity: g.quantity,
            revenue: g.revenue,
        })
        .collect();
    products.sort_by(|a, b| b.revenue.cmp(&a.revenue));
    products.truncate(limit);
    products
}

/// Resolves a product name to its category. Category is not stored on line
/// items, so reports ask the product catalog.
pub trait CategoryLookup {
    fn category_for(&self, product_name: &str) -> Option<String>;
}

impl CategoryLookup for HashMap<String, String> {
    fn category_for(&self, product_name: &str) -> Option<String> {
        self.get(product_name).cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySales {
    pub category: String,
    pub items_sold: u64,
    pub revenue: Money,
}

/// Line items grouped by category; unresolved or blank categories land in
/// [`UNCATEGORIZED`].
pub fn category_breakdown<'a>(
    items: impl IntoIterator<Item = &'a LineItem>,
    lookup: &dyn CategoryLookup,
) -> Vec<CategorySales> {
    let mut grouped: Grouped<QtyRevenue> = Grouped::new();
    for item in items {
        let category = lookup
            .category_for(&item.product_name)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| UNCATEGORIZED.to_string());
        let g = grouped.entry(&category);
        g.quantity += u64::from(item.quantity);
        g.revenue += item.total;
    }
    let mut categories: Vec<CategorySales> = grouped
        .into_groups()
        .into_iter()
        .map(|(category, g)| CategorySales {
            category,
            items_sold: g.quantity,
            revenue: g.revenue,
        })
        .collect();
    categories.sort_by(|a, b| b.revenue.cmp(&a.revenue));
    categories
}

// ---------------------------------------------------------------------------
// Order groupings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffSales {
    pub staff: String,
    pub orders: u64,
    pub revenue: Money,
    pub average_order_value: Money,
}

/// Orders and revenue per staff member (`"Unknown"` when unset). The
/// average is per staff member, never the global average.
pub fn staff_performance<T: AsOrder>(orders: &[T]) -> Vec<StaffSales> {
    let mut grouped: Grouped<MethodTotal> = Grouped::new();
    for order in orders.iter().map(AsOrder::as_order) {
        let staff = order
            .staff_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_STAFF);
        grouped.entry(staff).add(order.total);
    }
    let mut staff: Vec<StaffSales> = grouped
        .into_groups()
        .into_iter()
        .map(|(staff, g)| StaffSales {
            staff,
            orders: g.count,
            revenue: g.total,
            average_order_value: g.average(),
        })
        .collect();
    staff.sort_by(|a, b| b.revenue.cmp(&a.revenue));
    staff
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourlySales {
    /// `"HH:00"`, local time.
    pub hour: String,
    pub orders: u64,
    pub revenue: Money,
}

/// Orders per local hour of day, ascending. Hours without orders are
/// omitted; orders without a readable timestamp are skipped.
pub fn hourly_breakdown<T: AsOrder>(orders: &[T]) -> Vec<HourlySales> {
    let mut by_hour: BTreeMap<u32, MethodTotal> = BTreeMap::new();
    for order in orders.iter().map(AsOrder::as_order) {
        let Some(ts) = order
            .created_at
            .as_deref()
            .and_then(clock::parse_local_timestamp)
        else {
            continue;
        };
        by_hour.entry(ts.hour()).or_default().add(order.total);
    }
    by_hour
        .into_iter()
        .map(|(hour, g)| HourlySales {
            hour: format!("{hour:02}:00"),
            orders: g.count,
            revenue: g.total,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySales {
    pub date: String,
    pub orders: u64,
    pub gross_revenue: Money,
    pub tax_collected: Money,
    pub net_sales: Money,
}

/// Per local calendar day totals, ascending by day.
pub fn daily_breakdown<T: AsOrder>(orders: &[T]) -> Vec<DailySales> {
    let mut by_day: BTreeMap<NaiveDate, (u64, TaxTotals)> = BTreeMap::new();
    for order in orders.iter().map(AsOrder::as_order) {
        let Some(day) = order.created_at.as_deref().and_then(clock::local_date) else {
            continue;
        };
        let (count, totals) = by_day.entry(day).or_default();
        *count += 1;
        totals.tax_collected += order.tax;
        totals.net_sales += order.subtotal;
        totals.gross_revenue += order.total;
    }
    by_day
        .into_iter()
        .map(|(day, (orders, totals))| DailySales {
            date: clock::format_date(day),
            orders,
            gross_revenue: totals.gross_revenue,
            tax_collected: totals.tax_collected,
            net_sales: totals.net_sales,
        })
        .collect()
}

/// `sum(line totals) - subtotal` for one order. Surfaced by the accounting
/// export; a non-zero value means checkout wrote inconsistent records.
pub fn line_item_drift(order: &OrderWithItems) -> Money {
    let lines: Money = order.items.iter().map(|i| i.total).sum();
    lines - order.order.subtotal
}
