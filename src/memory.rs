use crate::util::{float_to_rounded_string, try_parse_f64};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryFit {
    pub slope: String,
    pub chi2: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    pub min_points: usize,
    /// Drop `head_trim`/`tail_trim` points before fitting.
    pub trim: bool,
    pub head_trim: usize,
    pub tail_trim: usize,
}

/// Reads the memory monitor table and fits `PSS + Swap` over `Time`.
pub fn fitted_data(path: &Path, opts: FitOptions) -> Option<MemoryFit> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("memory monitor output not readable: {} ({e})", path.display());
            return None;
        }
    };
    let (mut x, mut y) = parse_table(&raw)?;

    if opts.trim && x.len() > opts.head_trim + opts.tail_trim {
        let end = x.len() - opts.tail_trim;
        x = x[opts.head_trim..end].to_vec();
        y = y[opts.head_trim..end].to_vec();
    }
    if x.len() < opts.min_points {
        debug!("not enough memory monitor points for a fit: {}", x.len());
        return None;
    }
    fit(&x, &y)
}

fn parse_table(raw: &str) -> Option<(Vec<f64>, Vec<f64>)> {
    let mut lines = raw.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<&str> = lines.next()?.split_whitespace().collect();
    let col = |name: &str| header.iter().position(|h| h.eq_ignore_ascii_case(name));
    let (Some(t), Some(pss)) = (col("Time"), col("PSS")) else {
        warn!("memory monitor output lacks Time/PSS columns");
        return None;
    };
    let swap = col("Swap");

    let mut x = Vec::new();
    let mut y = Vec::new();
    for line in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let get = |i: usize| fields.get(i).and_then(|f| try_parse_f64(f));
        let (Some(tv), Some(pv)) = (get(t), get(pss)) else {
            continue;
        };
        let sv = swap.and_then(get).unwrap_or(0.0);
        x.push(tv);
        y.push(pv + sv);
    }
    Some((x, y))
}

// least squares; chi2 is Pearson's against the fitted line
fn fit(x: &[f64], y: &[f64]) -> Option<MemoryFit> {
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;
    let sxx: f64 = x.iter().map(|v| (v - mean_x).powi(2)).sum();
    if sxx == 0.0 {
        warn!("memory monitor time column is constant; no fit");
        return None;
    }
    let sxy: f64 = x
        .iter()
        .zip(y)
        .map(|(xv, yv)| (xv - mean_x) * (yv - mean_y))
        .sum();
    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let mut chi2 = 0.0;
    let mut chi2_ok = true;
    for (xv, yv) in x.iter().zip(y) {
        let expected = slope * xv + intercept;
        if expected <= 0.0 {
            chi2_ok = false;
            break;
        }
        chi2 += (yv - expected).powi(2) / expected;
    }

    Some(MemoryFit {
        slope: float_to_rounded_string(slope, 2),
        chi2: chi2_ok.then(|| float_to_rounded_string(chi2, 2)),
    })
}
