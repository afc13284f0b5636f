//! Performance benchmarks for the payroll calculation engine.
//!
//! Measures a full period calculation (gross pay plus the deduction
//! pipeline) for growing workforces, and a single employee in isolation.
//!
//! Run with: `cargo bench`
//! HTML reports are generated in `target/criterion/`

use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rust_decimal::Decimal;

use payroll_engine::calculation::CalculationEngine;
use payroll_engine::config::ConfigLoader;
use payroll_engine::models::{
    DeductionEnrolment, EmployeePayrollInfo, NewPeriod, PayrollPeriod, RateBasis,
};

fn create_engine() -> CalculationEngine {
    let config = ConfigLoader::load("./config/payroll").expect("Failed to load config");
    CalculationEngine::new(config.config().clone())
}

fn create_period() -> PayrollPeriod {
    PayrollPeriod::draft(
        NewPeriod {
            name: None,
            pay_group: None,
            start_date: NaiveDate::from_ymd_opt(2026, 1, 12).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 1, 25).unwrap(),
        },
        Utc::now(),
    )
}

fn enrol(code: &str) -> DeductionEnrolment {
    DeductionEnrolment {
        code: code.to_string(),
        amount: None,
        rate: None,
    }
}

/// A mixed workforce cycling through every rate basis.
fn create_workforce(size: usize) -> Vec<EmployeePayrollInfo> {
    (0..size)
        .map(|i| {
            let (rate_basis, rate, hours) = match i % 3 {
                0 => (RateBasis::Hourly, "32.50", Some("76")),
                1 => (RateBasis::Salary, "91000", None),
                _ => (RateBasis::PerPeriod, "2800", None),
            };
            let mut deductions = vec![enrol("salary_sacrifice"), enrol("health_cover")];
            if i % 10 == 0 {
                deductions.push(enrol("garnishment"));
            }
            EmployeePayrollInfo {
                employee_id: format!("emp_{i:05}"),
                active: true,
                rate_basis: Some(rate_basis),
                rate: Some(Decimal::from_str(rate).unwrap()),
                hours: hours.map(|h| Decimal::from_str(h).unwrap()),
                effective_from: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
                effective_to: None,
                deductions,
            }
        })
        .collect()
}

fn bench_single_employee(c: &mut Criterion) {
    let engine = create_engine();
    let period = create_period();
    let info = create_workforce(2).remove(1);

    c.bench_function("single_employee", |b| {
        b.iter(|| {
            engine
                .calculate_employee(black_box(&period), black_box(&info))
                .unwrap()
        })
    });
}

fn bench_period_calculation(c: &mut Criterion) {
    let engine = create_engine();
    let period = create_period();

    let mut group = c.benchmark_group("period_calculation");
    for size in [100usize, 1000] {
        let workforce = create_workforce(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &workforce, |b, workforce| {
            b.iter(|| engine.calculate(black_box(&period), black_box(workforce)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_single_employee, bench_period_calculation);
criterion_main!(benches);
