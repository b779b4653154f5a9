//! Library modules exposed to snippets.
//!
//! Each builder returns a self-contained [`Module`] with pure functions
//! only — no file system, process, network or interpreter access. The
//! executor registers exactly the modules named in the execution context's
//! allowlist, nothing else, regardless of what a snippet tries to import.
//!
//! Functions take `&mut Array` as their first parameter so they work both
//! namespaced (`stats::mean(x)`) and method-style (`x.mean()`).

use chrono::{DateTime, Datelike, NaiveDate};
use rhai::{Array, Dynamic, EvalAltResult, Module, Position, FLOAT, INT};

/// Names this sandbox can serve. An allowlisted name outside this set is
/// simply not registered (and imports of it fail at run time).
pub const LIBRARY_NAMES: &[&str] = &["stats", "math", "time", "table"];

/// Builds the module for `name`, or `None` if the sandbox has no library
/// of that name.
pub fn library_module(name: &str) -> Option<Module> {
    match name {
        "stats" => Some(stats_module()),
        "math" => Some(math_module()),
        "time" => Some(time_module()),
        "table" => Some(table_module()),
        _ => None,
    }
}

fn runtime_error(msg: impl Into<String>) -> Box<EvalAltResult> {
    let msg: String = msg.into();
    EvalAltResult::ErrorRuntime(Dynamic::from(msg), Position::NONE).into()
}

/// Coerces a column of ints/floats to f64, rejecting anything else.
fn numeric_column(values: &Array, op: &str) -> Result<Vec<FLOAT>, Box<EvalAltResult>> {
    let mut out = Vec::with_capacity(values.len());
    for v in values {
        let v = v.clone();
        if let Some(i) = v.clone().try_cast::<INT>() {
            out.push(i as FLOAT);
        } else if let Some(f) = v.try_cast::<FLOAT>() {
            out.push(f);
        } else {
            return Err(runtime_error(format!("{op}: column contains a non-numeric value")));
        }
    }
    Ok(out)
}

fn mean_of(values: &[FLOAT]) -> FLOAT {
    values.iter().sum::<FLOAT>() / values.len() as FLOAT
}

// ── stats ───────────────────────────────────────────────

fn stats_module() -> Module {
    let mut m = Module::new();

    m.set_native_fn("mean", |values: &mut Array| {
        let nums = numeric_column(values, "mean")?;
        if nums.is_empty() {
            return Err(runtime_error("mean: empty column"));
        }
        Ok(mean_of(&nums))
    });

    m.set_native_fn("sum", |values: &mut Array| {
        let nums = numeric_column(values, "sum")?;
        Ok(nums.iter().sum::<FLOAT>())
    });

    m.set_native_fn("median", |values: &mut Array| {
        let mut nums = numeric_column(values, "median")?;
        if nums.is_empty() {
            return Err(runtime_error("median: empty column"));
        }
        nums.sort_by(|a, b| a.total_cmp(b));
        let mid = nums.len() / 2;
        Ok(if nums.len() % 2 == 0 {
            (nums[mid - 1] + nums[mid]) / 2.0
        } else {
            nums[mid]
        })
    });

    m.set_native_fn("variance", |values: &mut Array| {
        let nums = numeric_column(values, "variance")?;
        if nums.len() < 2 {
            return Err(runtime_error("variance: need at least 2 values"));
        }
        let mean = mean_of(&nums);
        let ss = nums.iter().map(|v| (v - mean) * (v - mean)).sum::<FLOAT>();
        Ok(ss / (nums.len() - 1) as FLOAT)
    });

    m.set_native_fn("stdev", |values: &mut Array| {
        let nums = numeric_column(values, "stdev")?;
        if nums.len() < 2 {
            return Err(runtime_error("stdev: need at least 2 values"));
        }
        let mean = mean_of(&nums);
        let ss = nums.iter().map(|v| (v - mean) * (v - mean)).sum::<FLOAT>();
        Ok((ss / (nums.len() - 1) as FLOAT).sqrt())
    });

    // Linear interpolation between order statistics
    m.set_native_fn("quantile", |values: &mut Array, q: FLOAT| {
        if !(0.0..=1.0).contains(&q) {
            return Err(runtime_error("quantile: q must be in [0, 1]"));
        }
        let mut nums = numeric_column(values, "quantile")?;
        if nums.is_empty() {
            return Err(runtime_error("quantile: empty column"));
        }
        nums.sort_by(|a, b| a.total_cmp(b));
        let pos = q * (nums.len() - 1) as FLOAT;
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        let frac = pos - lo as FLOAT;
        Ok(nums[lo] + (nums[hi] - nums[lo]) * frac)
    });

    m
}

// ── math ────────────────────────────────────────────────

fn math_module() -> Module {
    let mut m = Module::new();

    m.set_native_fn("ln", |v: FLOAT| {
        if v <= 0.0 {
            return Err(runtime_error("ln: argument must be positive"));
        }
        Ok(v.ln())
    });
    m.set_native_fn("log10", |v: FLOAT| {
        if v <= 0.0 {
            return Err(runtime_error("log10: argument must be positive"));
        }
        Ok(v.log10())
    });
    m.set_native_fn("exp", |v: FLOAT| -> Result<FLOAT, Box<EvalAltResult>> { Ok(v.exp()) });
    m.set_native_fn("pow", |base: FLOAT, exp: FLOAT| -> Result<FLOAT, Box<EvalAltResult>> {
        Ok(base.powf(exp))
    });
    m.set_native_fn("sqrt", |v: FLOAT| {
        if v < 0.0 {
            return Err(runtime_error("sqrt: argument must be non-negative"));
        }
        Ok(v.sqrt())
    });
    m.set_native_fn("round_to", |v: FLOAT, digits: INT| -> Result<FLOAT, Box<EvalAltResult>> {
        let factor = (10.0 as FLOAT).powi(digits as i32);
        Ok((v * factor).round() / factor)
    });

    m
}

// ── time ────────────────────────────────────────────────

/// Dates travel through snippets as Unix timestamps (seconds, midnight UTC
/// for pure dates); everything here is deterministic — no "now".
fn time_module() -> Module {
    let mut m = Module::new();

    m.set_native_fn("parse_date", |text: &str, fmt: &str| {
        let date = NaiveDate::parse_from_str(text, fmt)
            .map_err(|e| runtime_error(format!("parse_date: {e}")))?;
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| runtime_error("parse_date: invalid date"))?;
        Ok(midnight.and_utc().timestamp())
    });

    m.set_native_fn("format_timestamp", |ts: INT, fmt: &str| {
        let dt = DateTime::from_timestamp(ts, 0)
            .ok_or_else(|| runtime_error("format_timestamp: timestamp out of range"))?;
        Ok(dt.format(fmt).to_string())
    });

    m.set_native_fn("year", |ts: INT| {
        let dt = DateTime::from_timestamp(ts, 0)
            .ok_or_else(|| runtime_error("year: timestamp out of range"))?;
        Ok(dt.year() as INT)
    });

    m.set_native_fn("month", |ts: INT| {
        let dt = DateTime::from_timestamp(ts, 0)
            .ok_or_else(|| runtime_error("month: timestamp out of range"))?;
        Ok(dt.month() as INT)
    });

    m.set_native_fn("day", |ts: INT| {
        let dt = DateTime::from_timestamp(ts, 0)
            .ok_or_else(|| runtime_error("day: timestamp out of range"))?;
        Ok(dt.day() as INT)
    });

    m.set_native_fn("days_between", |a: INT, b: INT| -> Result<INT, Box<EvalAltResult>> {
        Ok((b - a) / 86_400)
    });

    m
}

// ── table ───────────────────────────────────────────────

/// Helpers over row-oriented data: an array of maps, one map per row.
fn table_module() -> Module {
    let mut m = Module::new();

    m.set_native_fn("column", |rows: &mut Array, name: &str| {
        let mut out = Array::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let map = row
                .clone()
                .try_cast::<rhai::Map>()
                .ok_or_else(|| runtime_error(format!("column: row {i} is not a map")))?;
            let value = map
                .get(name)
                .cloned()
                .ok_or_else(|| runtime_error(format!("column: row {i} has no field `{name}`")))?;
            out.push(value);
        }
        Ok(out)
    });

    // Order-preserving; equality by textual rendering since Dynamic has no
    // total equality.
    m.set_native_fn("unique", |values: &mut Array| {
        let mut seen: Vec<String> = Vec::new();
        let mut out = Array::new();
        for v in values.iter() {
            let key = v.to_string();
            if !seen.contains(&key) {
                seen.push(key);
                out.push(v.clone());
            }
        }
        Ok(out)
    });

    m
}
