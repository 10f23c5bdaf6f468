use chrono::{Local, NaiveDate};
use clap::Args;
use procan_intake::error::AppError;
use procan_intake::workflows::intake::{
    compute_quote, round_cents, BillingCadence, DeepCleanLevel, DeepCleanScope, DeepCleanService,
    PadCadence, PadService, PadSize, Quote, QuoteRequest, TrashCadence, TrashService,
};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;

#[derive(Args, Debug, Default)]
pub(crate) struct QuoteArgs {
    /// Total trash cans serviced per location
    #[arg(long, default_value_t = 0)]
    pub(crate) cans: u32,
    /// Trash can cadence: biweekly, monthly, or none
    #[arg(long, value_parser = parse_choice::<TrashCadence>, default_value = "biweekly")]
    pub(crate) cadence: TrashCadence,
    /// Add a dumpster pad cleaning of this size: small, medium, or large
    #[arg(long, value_parser = parse_choice::<PadSize>)]
    pub(crate) pad_size: Option<PadSize>,
    /// Dumpster pad cadence: weekly, biweekly, or monthly
    #[arg(long, value_parser = parse_choice::<PadCadence>, default_value = "weekly")]
    pub(crate) pad_cadence: PadCadence,
    /// Add a one-time deep clean: standard, heavy, or extreme
    #[arg(long, value_parser = parse_choice::<DeepCleanLevel>)]
    pub(crate) deep_clean: Option<DeepCleanLevel>,
    /// Deep clean only this many cans instead of all of them
    #[arg(long)]
    pub(crate) deep_qty: Option<u32>,
    /// Number of service locations
    #[arg(long, default_value_t = 1)]
    pub(crate) locations: u32,
    /// Billing interval: monthly, quarterly, or annual
    #[arg(long, value_parser = parse_choice::<BillingCadence>, default_value = "monthly")]
    pub(crate) billing: BillingCadence,
    /// Quote a single visit instead of a recurring plan
    #[arg(long)]
    pub(crate) one_time: bool,
    /// Reserve the route slot with a deposit
    #[arg(long)]
    pub(crate) deposit: bool,
    /// First service date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) start_date: Option<NaiveDate>,
    /// Promo code to apply
    #[arg(long)]
    pub(crate) promo: Option<String>,
    /// Evaluate as of this date instead of today (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Print the full breakdown as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) fn parse_choice<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
    serde_json::from_value(serde_json::Value::String(normalized))
        .map_err(|_| format!("'{raw}' is not a recognised option"))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

impl QuoteArgs {
    pub(crate) fn to_request(&self) -> QuoteRequest {
        let deep_clean = match self.deep_clean {
            Some(level) => DeepCleanService {
                enabled: true,
                level,
                applies_to: if self.deep_qty.is_some() {
                    DeepCleanScope::SomeCans
                } else {
                    DeepCleanScope::AllCans
                },
                quantity: self.deep_qty.unwrap_or_default(),
            },
            None => DeepCleanService::default(),
        };

        QuoteRequest {
            trash: TrashService {
                cadence: self.cadence,
                can_count: self.cans,
            },
            pad: PadService {
                enabled: self.pad_size.is_some(),
                size: self.pad_size.unwrap_or_default(),
                cadence: self.pad_cadence,
            },
            deep_clean,
            locations: self.locations,
            billing: self.billing,
            one_time_only: self.one_time,
            deposit_reservation: self.deposit,
            start_date: self.start_date,
            promo_code: self.promo.clone(),
            today: self.today,
        }
    }
}

pub(crate) fn run_quote(args: QuoteArgs) -> Result<(), AppError> {
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let inputs = args.to_request().into_inputs(today)?;
    let quote = compute_quote(&inputs)?;

    if args.json {
        let rendered = serde_json::to_string_pretty(&quote)
            .map_err(|err| AppError::Io(std::io::Error::other(err)))?;
        println!("{rendered}");
    } else {
        render_quote(&quote);
    }
    Ok(())
}

pub(crate) fn render_quote(quote: &Quote) {
    print!("{}", format_quote(quote));
}

/// Every amount is shown rounded the same way the checkout session charges it.
fn money(amount: Decimal) -> String {
    format!("${}", round_cents(amount))
}

pub(crate) fn format_quote(quote: &Quote) -> String {
    let mut lines = vec!["ProCan quote".to_string()];
    if quote.one_time_only {
        lines.push("Plan: one-time service".to_string());
    } else {
        lines.push(format!(
            "Plan: recurring, billed {} ({} month term)",
            quote.billing_cadence.label(),
            quote.term_months
        ));
    }
    match quote.start_date {
        Some(start) => lines.push(format!("Start date: {start}")),
        None => lines.push("Start date: not set".to_string()),
    }

    lines.push("\nServices".to_string());
    if quote.can_count > 0 && quote.trash_cadence != TrashCadence::None {
        lines.push(format!(
            "- Trash cans: {} x {} ({}, {} visits/month) = {}/month",
            quote.can_count,
            money(quote.trash_per_can),
            quote.trash_cadence.label(),
            quote.trash_visits_per_month,
            money(quote.trash_monthly)
        ));
    }
    if let Some(pad) = &quote.pad {
        lines.push(format!(
            "- Dumpster pad: {} {} = {}/month",
            pad.size.label(),
            pad.cadence.label(),
            money(pad.monthly)
        ));
    }
    if let Some(deep) = &quote.deep_clean {
        lines.push(format!(
            "- Deep clean ({}): {} cans x {} = {}",
            deep.level.label(),
            deep.cans,
            money(deep.per_can),
            money(deep.total)
        ));
    }
    if !quote.has_service() {
        lines.push("- none selected".to_string());
    }

    lines.push("\nPricing".to_string());
    lines.push(format!("- Locations: {}", quote.locations));
    if let Some(code) = &quote.discount_code {
        let percent = (quote.promo_rate * Decimal::ONE_HUNDRED).normalize();
        lines.push(format!("- Promo {code}: {percent}% off"));
    }
    if quote.one_time_only {
        lines.push(format!("- Per visit: {}", money(quote.per_visit_total)));
    } else {
        lines.push(format!("- Base monthly: {}", money(quote.base_monthly)));
        lines.push(format!("- Monthly total: {}", money(quote.monthly_total)));
    }
    lines.push(format!("- Discounts: {}", money(quote.discount_total)));
    if quote.is_deposit {
        lines.push(format!(
            "- Due today: {} deposit (normally {})",
            money(quote.due_today),
            money(quote.normal_due_today)
        ));
    } else if quote.capture_only {
        lines.push(
            "- Due today: $0.00 (card saved, billing starts on the start date)".to_string(),
        );
    } else {
        lines.push(format!("- Due today: {}", money(quote.due_today)));
    }

    let mut rendered = lines.join("\n");
    rendered.push('\n');
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_choices_case_insensitively() {
        assert_eq!(parse_choice::<PadSize>("Large"), Ok(PadSize::Large));
        assert_eq!(
            parse_choice::<BillingCadence>("QUARTERLY"),
            Ok(BillingCadence::Quarterly)
        );
        assert!(parse_choice::<TrashCadence>("weekly").is_err());
    }

    #[test]
    fn args_map_onto_quote_request() {
        let args = QuoteArgs {
            cans: 15,
            cadence: TrashCadence::Biweekly,
            deep_clean: Some(DeepCleanLevel::Heavy),
            deep_qty: Some(4),
            locations: 1,
            one_time: true,
            ..QuoteArgs::default()
        };
        let request = args.to_request();
        assert!(request.deep_clean.enabled);
        assert_eq!(request.deep_clean.applies_to, DeepCleanScope::SomeCans);
        assert_eq!(request.deep_clean.quantity, 4);
        assert!(!request.pad.enabled);
    }

    #[test]
    fn one_time_quote_runs_end_to_end() {
        let args = QuoteArgs {
            cans: 15,
            cadence: TrashCadence::Biweekly,
            locations: 1,
            one_time: true,
            today: NaiveDate::from_ymd_opt(2026, 3, 10),
            ..QuoteArgs::default()
        };
        let inputs = args
            .to_request()
            .into_inputs(NaiveDate::from_ymd_opt(2026, 3, 10).expect("date"))
            .expect("no promo");
        let quote = compute_quote(&inputs).expect("quote");
        assert_eq!(quote.due_today, dec!(345));
    }

    #[test]
    fn unknown_promo_is_reported() {
        let args = QuoteArgs {
            cans: 10,
            promo: Some("BOGUS".to_string()),
            ..QuoteArgs::default()
        };
        let err = run_quote(args).expect_err("unknown code");
        assert_eq!(err.to_string(), "quote error: Invalid discount code.");
    }

    #[test]
    fn rendered_amounts_match_the_charged_cents() {
        let args = QuoteArgs {
            cans: 7,
            cadence: TrashCadence::Biweekly,
            locations: 4,
            billing: BillingCadence::Quarterly,
            promo: Some("EA2026".to_string()),
            today: NaiveDate::from_ymd_opt(2026, 3, 10),
            ..QuoteArgs::default()
        };
        let inputs = args
            .to_request()
            .into_inputs(NaiveDate::from_ymd_opt(2026, 3, 10).expect("date"))
            .expect("registry code");
        let quote = compute_quote(&inputs).expect("quote");
        assert_eq!(quote.monthly_total, dec!(140.714));
        assert_eq!(quote.due_today, dec!(422.142));

        let rendered = format_quote(&quote);
        assert!(rendered.contains("- Base monthly: $175.00\n"), "{rendered}");
        assert!(rendered.contains("- Monthly total: $140.71\n"), "{rendered}");
        assert!(rendered.contains("- Due today: $422.14\n"), "{rendered}");
        assert!(!rendered.contains("422.142"), "{rendered}");
    }
}
