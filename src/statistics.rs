//! Aggregates over the declarations snapshot.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::declaration::{Declaration, Sex};

/// One slice of a pie chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Share {
    pub name: &'static str,
    pub value: usize,
    pub percent: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SexPoint {
    pub mois: String,
    #[serde(rename = "Garçons")]
    pub boys: usize,
    #[serde(rename = "Filles")]
    pub girls: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TotalPoint {
    pub mois: String,
    #[serde(rename = "Total")]
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total: usize,
    pub by_sex: Vec<Share>,
    pub by_marital_status: Vec<Share>,
    pub line_chart: Vec<SexPoint>,
    pub bar_chart: Vec<TotalPoint>,
}

/// `count / total` as a percentage with one decimal, `0%` without data.
pub fn percent(count: usize, total: usize) -> String {
    if total == 0 {
        return "0%".to_owned();
    }

    // f64::round goes half away from zero.
    let value = (count as f64 / total as f64 * 1000.0).round() / 10.0;
    format!("{value:.1}%")
}

fn share(name: &'static str, value: usize, total: usize) -> Share {
    Share {
        name,
        value,
        percent: percent(value, total),
    }
}

/// Year-month bucket of a birth date.
pub fn month_key(birth_date: &str) -> String {
    birth_date.chars().take(7).collect()
}

type MonthlyCounts = BTreeMap<String, usize>;

fn monthly(declarations: &[Declaration], sex: Sex) -> MonthlyCounts {
    declarations
        .iter()
        .filter(|d| d.child.sex == Some(sex) && !d.child.birth_date.is_empty())
        .fold(MonthlyCounts::new(), |mut acc, d| {
            *acc.entry(month_key(&d.child.birth_date)).or_default() += 1;
            acc
        })
}

/// Compute every statistic shown on the statistics page.
pub fn compute(declarations: &[Declaration]) -> Statistics {
    let total = declarations.len();
    let boys = declarations
        .iter()
        .filter(|d| d.child.sex == Some(Sex::Male))
        .count();
    let girls = declarations
        .iter()
        .filter(|d| d.child.sex == Some(Sex::Female))
        .count();
    let married = declarations.iter().filter(|d| d.marriage.married).count();

    let monthly_boys = monthly(declarations, Sex::Male);
    let monthly_girls = monthly(declarations, Sex::Female);
    let months: BTreeSet<&String> = monthly_boys.keys().chain(monthly_girls.keys()).collect();

    let count = |counts: &MonthlyCounts, month: &str| counts.get(month).copied().unwrap_or(0);

    let line_chart: Vec<SexPoint> = months
        .iter()
        .map(|mois| SexPoint {
            mois: (*mois).clone(),
            boys: count(&monthly_boys, mois),
            girls: count(&monthly_girls, mois),
        })
        .collect();
    let bar_chart = line_chart
        .iter()
        .map(|point| TotalPoint {
            mois: point.mois.clone(),
            total: point.boys + point.girls,
        })
        .collect();

    Statistics {
        total,
        by_sex: vec![share("Garçons", boys, total), share("Filles", girls, total)],
        by_marital_status: vec![
            share("Parents mariés", married, total),
            share("Parents non mariés", total - married, total),
        ],
        line_chart,
        bar_chart,
    }
}
