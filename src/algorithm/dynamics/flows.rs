//! Gross job flows
//!
//! Hires, separations and continuing employment per (date, cell), with rates
//! over employment. The data path is chosen from the table's capabilities:
//! employee identifiers when present, else pre-aggregated hire and separation
//! counts, else client entry and exit.

use chrono::NaiveDate;
use log::{debug, warn};
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::models::cell::{CellKey, Dimension};
use crate::models::client_month::{ClientMonth, ClientMonthTable};
use crate::models::period::Quarter;
use crate::utils::arrow::table::{self, ArrowTable};
use crate::utils::stats::safe_divisor;

/// Where hires and separations come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowSource {
    /// Month-over-month presence of employee identifiers
    Employees,
    /// Pre-aggregated `hires` and `separations` columns
    Reported,
    /// Employment of entering and exiting clients
    ClientEntryExit,
}

impl FlowSource {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Employees => "employees",
            Self::Reported => "reported",
            Self::ClientEntryExit => "client_entry_exit",
        }
    }

    #[must_use]
    pub fn for_table(table: &ClientMonthTable) -> Self {
        let capabilities = table.capabilities();
        if capabilities.has_employee_id {
            Self::Employees
        } else if capabilities.has_flow_columns {
            Self::Reported
        } else {
            Self::ClientEntryExit
        }
    }
}

impl fmt::Display for FlowSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Job flows of one (date, cell)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobFlowRow {
    pub ref_date: NaiveDate,
    pub quarter: String,
    pub supersector: Option<String>,
    pub state_fips: Option<String>,
    pub size_class: Option<String>,
    pub employment: i64,
    pub hires: i64,
    pub separations: i64,
    pub continuing_employment: i64,
    pub hire_rate: f64,
    pub separation_rate: f64,
    pub churn_rate: f64,
    pub net_growth_rate: f64,
    pub source: String,
}

impl JobFlowRow {
    fn new(
        ref_date: NaiveDate,
        cell: &CellKey,
        employment: i64,
        hires: i64,
        separations: i64,
        continuing_employment: i64,
        source: FlowSource,
    ) -> Self {
        let denominator = safe_divisor(Some(employment as f64));
        Self {
            ref_date,
            quarter: Quarter::from_date(ref_date).to_string(),
            supersector: cell.supersector.clone(),
            state_fips: cell.state_fips.clone(),
            size_class: cell.size_class.clone(),
            employment,
            hires,
            separations,
            continuing_employment,
            hire_rate: hires as f64 / denominator,
            separation_rate: separations as f64 / denominator,
            churn_rate: (hires + separations) as f64 / denominator,
            net_growth_rate: (hires - separations) as f64 / denominator,
            source: source.label().to_string(),
        }
    }
}

impl ArrowTable for JobFlowRow {
    fn fields() -> Vec<arrow::datatypes::Field> {
        let mut fields = vec![table::date("ref_date", false), table::utf8("quarter", false)];
        fields.extend(table::cell_fields());
        fields.extend([
            table::int64("employment", false),
            table::int64("hires", false),
            table::int64("separations", false),
            table::int64("continuing_employment", false),
            table::float64("hire_rate", false),
            table::float64("separation_rate", false),
            table::float64("churn_rate", false),
            table::float64("net_growth_rate", false),
            table::utf8("source", false),
        ]);
        fields
    }
}

fn group_records<'a>(
    records: &'a [ClientMonth],
    dimensions: &[Dimension],
) -> BTreeMap<(NaiveDate, CellKey), Vec<&'a ClientMonth>> {
    let mut groups: BTreeMap<(NaiveDate, CellKey), Vec<&ClientMonth>> = BTreeMap::new();
    for record in records {
        groups
            .entry((record.ref_date, record.cell(dimensions)))
            .or_default()
            .push(record);
    }
    groups
}

/// Hires, separations and rates per (date, cell), ordered by date then cell
///
/// Rates divide by employment, or by 1 when employment is zero. In the
/// employee path the first period of a cell counts every employee as a hire.
#[must_use]
pub fn compute_job_flows(table: &ClientMonthTable, dimensions: &[Dimension]) -> Vec<JobFlowRow> {
    let source = FlowSource::for_table(table);
    debug!("Job flows over {dimensions:?} from {source}");

    match source {
        FlowSource::Employees => employee_flows(table.records(), dimensions),
        FlowSource::Reported | FlowSource::ClientEntryExit => {
            aggregate_flows(table.records(), dimensions, source)
        }
    }
}

fn aggregate_flows(
    records: &[ClientMonth],
    dimensions: &[Dimension],
    source: FlowSource,
) -> Vec<JobFlowRow> {
    group_records(records, dimensions)
        .into_iter()
        .map(|((ref_date, cell), group)| {
            let employment: i64 = group.iter().map(|r| r.employment).sum();
            let (hires, separations) = match source {
                FlowSource::Reported => (
                    group.iter().filter_map(|r| r.hires).sum(),
                    group.iter().filter_map(|r| r.separations).sum(),
                ),
                _ => (
                    group.iter().filter(|r| r.is_entry()).map(|r| r.employment).sum(),
                    group.iter().filter(|r| r.is_exit()).map(|r| r.employment).sum(),
                ),
            };
            JobFlowRow::new(
                ref_date,
                &cell,
                employment,
                hires,
                separations,
                employment - hires,
                source,
            )
        })
        .collect()
}

fn employee_flows(records: &[ClientMonth], dimensions: &[Dimension]) -> Vec<JobFlowRow> {
    let mut by_cell: BTreeMap<CellKey, BTreeMap<NaiveDate, FxHashSet<&str>>> = BTreeMap::new();
    let mut missing = 0usize;
    for record in records {
        let Some(employee) = record.employee_id.as_deref() else {
            missing += 1;
            continue;
        };
        by_cell
            .entry(record.cell(dimensions))
            .or_default()
            .entry(record.ref_date)
            .or_default()
            .insert(employee);
    }
    if missing > 0 {
        warn!("{missing} records without an employee identifier left out of job flows");
    }

    let empty = FxHashSet::default();
    let mut rows = Vec::new();
    for (cell, periods) in &by_cell {
        let mut previous = &empty;
        for (ref_date, current) in periods {
            let hires = current.difference(previous).count() as i64;
            let separations = previous.difference(current).count() as i64;
            let continuing = current.intersection(previous).count() as i64;
            rows.push(JobFlowRow::new(
                *ref_date,
                cell,
                current.len() as i64,
                hires,
                separations,
                continuing,
                FlowSource::Employees,
            ));
            previous = current;
        }
    }

    rows.sort_by(|a, b| {
        (a.ref_date, &a.supersector, &a.state_fips, &a.size_class).cmp(&(
            b.ref_date,
            &b.supersector,
            &b.state_fips,
            &b.size_class,
        ))
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::client_month::BirthStatus;

    fn date(m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, m, 12).unwrap()
    }

    fn record(id: &str, m: u32, entry: u32, exit: Option<u32>, emp: i64) -> ClientMonth {
        ClientMonth::new(
            id,
            date(m),
            date(entry),
            exit.map(date),
            BirthStatus::Undeterminable,
            "236220",
            "06",
            emp,
        )
    }

    #[test]
    fn entry_exit_path() {
        let table = ClientMonthTable::new(vec![
            record("a", 2, 2, None, 10),
            record("b", 2, 1, Some(2), 4),
            record("c", 2, 1, None, 6),
        ]);
        let rows = compute_job_flows(&table, &[]);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.source, "client_entry_exit");
        assert_eq!(row.employment, 20);
        assert_eq!(row.hires, 10);
        assert_eq!(row.separations, 4);
        assert_eq!(row.continuing_employment, 10);
        assert!((row.hire_rate - 0.5).abs() < 1e-12);
        assert!((row.churn_rate - 0.7).abs() < 1e-12);
        assert!((row.net_growth_rate - 0.3).abs() < 1e-12);
    }

    #[test]
    fn reported_flows_path() {
        let table = ClientMonthTable::new(vec![
            record("a", 1, 1, None, 10).with_flows(3, 1),
            record("b", 1, 1, None, 10).with_flows(2, 2),
        ]);
        let rows = compute_job_flows(&table, &[]);
        assert_eq!(rows[0].source, "reported");
        assert_eq!(rows[0].hires, 5);
        assert_eq!(rows[0].separations, 3);
        assert_eq!(rows[0].continuing_employment, 15);
    }

    #[test]
    fn employee_path_tracks_presence() {
        let table = ClientMonthTable::new(vec![
            record("a", 1, 1, None, 1).with_employee_id("e1"),
            record("a", 1, 1, None, 1).with_employee_id("e2"),
            record("a", 2, 1, None, 1).with_employee_id("e2"),
            record("a", 2, 1, None, 1).with_employee_id("e3"),
            record("a", 2, 1, None, 1).with_employee_id("e4"),
        ]);
        let rows = compute_job_flows(&table, &[Dimension::Supersector]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].source, "employees");
        assert_eq!(rows[0].hires, 2);
        assert_eq!(rows[0].continuing_employment, 0);
        assert_eq!(rows[1].employment, 3);
        assert_eq!(rows[1].hires, 2);
        assert_eq!(rows[1].separations, 1);
        assert_eq!(rows[1].continuing_employment, 1);
        assert_eq!(rows[1].supersector.as_deref(), Some("Construction"));
    }

    #[test]
    fn zero_employment_divides_by_one() {
        let table = ClientMonthTable::new(vec![record("a", 1, 1, None, 0)]);
        let rows = compute_job_flows(&table, &[]);
        assert_eq!(rows[0].hire_rate, 0.0);
        assert!(rows[0].hire_rate.is_finite());
    }

    #[test]
    fn empty_table_gives_no_rows() {
        assert!(compute_job_flows(&ClientMonthTable::default(), &[]).is_empty());
    }
}
