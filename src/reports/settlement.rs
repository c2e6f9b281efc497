//! Daily settlement report: the printable end-of-day summary.

use std::fmt;

use serde::Serialize;

use super::{DataSource, ReportRange};
use crate::aggregation::{
    self, CategoryLookup, CategorySales, HourlySales, PaymentBreakdown, ProductSales, StaffSales,
};
use crate::models::{OrderWithItems, StoreSettings};
use crate::money::Money;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReport {
    pub start_date: String,
    pub end_date: String,
    pub source: DataSource,
    pub currency: String,
    pub total_revenue: Money,
    pub payments: PaymentBreakdown,
    pub tax_collected: Money,
    pub net_sales: Money,
    pub total_orders: u64,
    pub items_sold: u64,
    pub average_order_value: Money,
    /// `net / total × 100`, one decimal.
    pub gross_margin_percent: f64,
    /// Cash the drawer should hold from sales (no opening float tracked).
    pub expected_cash: Money,
    pub top_products: Vec<ProductSales>,
    pub category_breakdown: Vec<CategorySales>,
    pub staff_performance: Vec<StaffSales>,
    pub hourly_breakdown: Vec<HourlySales>,
    pub orders: Vec<OrderWithItems>,
}

impl SettlementReport {
    /// Build from an already loaded, cancellation-filtered order set.
    pub fn from_orders(
        range: &ReportRange,
        orders: Vec<OrderWithItems>,
        catalog: &dyn CategoryLookup,
        settings: &StoreSettings,
        top_products_limit: usize,
    ) -> Self {
        let payments = aggregation::sum_by_payment_method(&orders);
        let totals = aggregation::tax_and_net_totals(&orders);
        let total_orders = orders.len() as u64;

        SettlementReport {
            start_date: range.start_str(),
            end_date: range.end_str(),
            source: range.source,
            currency: settings.currency.clone(),
            total_revenue: totals.gross_revenue,
            tax_collected: totals.tax_collected,
            net_sales: totals.net_sales,
            total_orders,
            items_sold: aggregation::items_sold(aggregation::line_items(&orders)),
            average_order_value: aggregation::average_order_value(totals.gross_revenue, total_orders),
            gross_margin_percent: totals.net_sales.percent_of(totals.gross_revenue),
            expected_cash: payments.cash.total,
            top_products: aggregation::top_products_by_revenue(
                aggregation::line_items(&orders),
                top_products_limit,
            ),
            category_breakdown: aggregation::category_breakdown(aggregation::line_items(&orders), catalog),
            staff_performance: aggregation::staff_performance(&orders),
            hourly_breakdown: aggregation::hourly_breakdown(&orders),
            payments,
            orders,
        }
    }

    /// No orders in range; rendered as a "no data" page, not an error.
    pub fn is_empty(&self) -> bool {
        self.total_orders == 0
    }

    /// Plain-text rendering for receipt printers and logs.
    pub fn render_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SettlementReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cur = &self.currency;
        writeln!(f, "Daily Settlement Report")?;
        if self.start_date == self.end_date {
            writeln!(f, "Report Date: {}", self.start_date)?;
        } else {
            writeln!(f, "Period: {} to {}", self.start_date, self.end_date)?;
        }
        writeln!(f, "{}", "=".repeat(40))?;

        if self.is_empty() {
            return writeln!(f, "No sales recorded for this period.");
        }

        writeln!(f, "{:<18}{cur} {}", "Total Revenue:", self.total_revenue)?;
        writeln!(f, "{:<18}{}", "Total Orders:", self.total_orders)?;
        writeln!(f, "{:<18}{cur} {}", "Net Sales:", self.net_sales)?;
        writeln!(f, "{:<18}{cur} {}", "Tax Collected:", self.tax_collected)?;
        writeln!(f, "{:<18}{}", "Items Sold:", self.items_sold)?;
        writeln!(f, "{:<18}{cur} {}", "Avg Order Value:", self.average_order_value)?;
        writeln!(f, "{:<18}{:.1}%", "Gross Margin:", self.gross_margin_percent)?;

        writeln!(f, "\nPayment Method Breakdown")?;
        let rows = [
            ("Cash", self.payments.cash),
            ("Card", self.payments.card),
            ("Online", self.payments.online),
            ("Other", self.payments.other),
        ];
        for (label, m) in rows {
            if label == "Other" && m.count == 0 {
                continue;
            }
            writeln!(
                f,
                "  {label:<8}{:>4}  {cur} {:>10}  {:>5.1}%",
                m.count,
                m.total,
                m.total.percent_of(self.total_revenue)
            )?;
        }

        writeln!(f, "\nCash Reconciliation")?;
        writeln!(f, "  {:<22}{cur} {}", "Cash Sales:", self.payments.cash.total)?;
        writeln!(f, "  {:<22}{cur} {}", "Total Cash Expected:", self.expected_cash)?;

        if !self.top_products.is_empty() {
            writeln!(f, "\nTop Selling Products")?;
            for (i, p) in self.top_products.iter().enumerate() {
                writeln!(f, "  {:>2}. {:<24}{:>4}  {cur} {}", i + 1, p.name, p.quantity, p.revenue)?;
            }
        }

        if !self.category_breakdown.is_empty() {
            writeln!(f, "\nSales by Category")?;
            for c in &self.category_breakdown {
                writeln!(f, "  {:<24}{:>4}  {cur} {}", c.category, c.items_sold, c.revenue)?;
            }
        }

        writeln!(f, "\nStaff Performance")?;
        for s in &self.staff_performance {
            writeln!(
                f,
                "  {:<16}{:>4}  {cur} {:>10}  avg {cur} {}",
                s.staff, s.orders, s.revenue, s.average_order_value
            )?;
        }

        writeln!(f, "\nHourly Sales")?;
        for h in &self.hourly_breakdown {
            writeln!(f, "  {}  {:>4}  {cur} {}", h.hour, h.orders, h.revenue)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::tests::{archive_day, day, seeded_store};
    use crate::reports::{load_orders, ProductCatalog, ReportGenerator};

    #[tokio::test]
    async fn test_settlement_report_figures() {
        let store = seeded_store().await;
        let reports = ReportGenerator::new(store, 10);
        let report = reports
            .build_settlement_report(&ReportRange::day(day("2024-01-15"), DataSource::Live))
            .await
            .unwrap();

        // The cancelled 40.00 order is left out.
        assert_eq!(report.total_orders, 3);
        assert_eq!(report.total_revenue, Money::from_cents(17500));
        assert_eq!(report.tax_collected, Money::from_cents(1750));
        assert_eq!(report.net_sales, Money::from_cents(15750));
        assert_eq!(report.payments.cash.count, 2);
        assert_eq!(report.payments.cash.total, Money::from_cents(12500));
        assert_eq!(report.payments.card.total, Money::from_cents(5000));
        assert_eq!(report.expected_cash, Money::from_cents(12500));
        assert_eq!(report.items_sold, 6);
        assert_eq!(report.average_order_value, Money::from_cents(5833));
        assert_eq!(report.gross_margin_percent, 90.0);
        assert_eq!(report.currency, "AED");

        assert_eq!(report.top_products[0].name, "Latte");
        assert_eq!(report.top_products[0].quantity, 3);
        assert_eq!(report.top_products[0].revenue, Money::from_cents(8250));

        let categories: Vec<&str> = report
            .category_breakdown
            .iter()
            .map(|c| c.category.as_str())
            .collect();
        assert_eq!(categories, vec!["Coffee", "Uncategorized", "Bakery"]);

        let staff: Vec<&str> = report.staff_performance.iter().map(|s| s.staff.as_str()).collect();
        assert_eq!(staff, vec!["Amal", "Omar", "Unknown"]);

        let hours: Vec<&str> = report.hourly_breakdown.iter().map(|h| h.hour.as_str()).collect();
        assert_eq!(hours, vec!["09:00", "12:00"]);
    }

    #[tokio::test]
    async fn test_same_figures_from_live_and_archive() {
        let store = seeded_store().await;
        let reports = ReportGenerator::new(store.clone(), 10);
        let range = |source| ReportRange::day(day("2024-01-15"), source);
        let live = reports.build_settlement_report(&range(DataSource::Live)).await.unwrap();

        archive_day(&store, "2024-01-15").await;
        let archived = reports
            .build_settlement_report(&range(DataSource::Archived))
            .await
            .unwrap();

        assert_eq!(archived.total_orders, 3);
        assert_eq!(archived.orders.len(), live.orders.len());
        // Every figure matches; only the source label and the carried orders differ.
        let archived_as_live = SettlementReport {
            source: live.source,
            orders: live.orders.clone(),
            ..archived
        };
        assert_eq!(archived_as_live, live);
    }

    #[tokio::test]
    async fn test_empty_range_renders_no_data() {
        let store = seeded_store().await;
        let reports = ReportGenerator::new(store, 10);
        let report = reports
            .build_settlement_report(&ReportRange::day(day("2023-06-01"), DataSource::Both))
            .await
            .unwrap();
        assert!(report.is_empty());
        assert_eq!(report.total_revenue, Money::ZERO);
        assert_eq!(report.gross_margin_percent, 0.0);
        assert!(report.render_text().contains("No sales recorded"));
    }

    #[tokio::test]
    async fn test_render_text_summary() {
        let store = seeded_store().await;
        let range = ReportRange::day(day("2024-01-15"), DataSource::Live);
        let orders = load_orders(store.as_ref(), &range).await.unwrap();
        let catalog: ProductCatalog = [("Latte".to_string(), "Coffee".to_string())].into_iter().collect();
        let settings = StoreSettings {
            currency: "USD".into(),
            ..StoreSettings::default()
        };
        let text = SettlementReport::from_orders(&range, orders, &catalog, &settings, 2).render_text();
        assert!(text.contains("Report Date: 2024-01-15"));
        assert!(text.contains("Total Revenue:    USD 175.00"));
        assert!(text.contains("Gross Margin:     90.0%"));
        assert!(!text.contains("Other"));
    }
}
