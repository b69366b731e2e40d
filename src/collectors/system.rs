use crate::collectors::CollectError;

const CPU_LINE_PREFIX: &str = "cpu ";
const CPU_MIN_FIELDS: usize = 8;

// busy = user + nice + system over busy + idle; the line needs at least 8 fields
pub fn parse_cpu_usage(content: &str) -> Result<f64, CollectError> {
    let line = content
        .lines()
        .find(|l| l.starts_with(CPU_LINE_PREFIX))
        .ok_or_else(|| CollectError::Parse("no aggregate cpu line in stat".to_string()))?;

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < CPU_MIN_FIELDS {
        return Err(CollectError::Parse(format!(
            "cpu line has {} fields, expected at least {CPU_MIN_FIELDS}",
            fields.len()
        )));
    }

    let user = parse_u64(fields[1], "user")?;
    let nice = parse_u64(fields[2], "nice")?;
    let system = parse_u64(fields[3], "system")?;
    let idle = parse_u64(fields[4], "idle")?;

    let busy = user.saturating_add(nice).saturating_add(system);
    let total = busy.saturating_add(idle);
    if total == 0 {
        return Err(CollectError::InvalidMetric(
            "total cpu jiffies is zero".to_string(),
        ));
    }
    Ok(busy as f64 / total as f64 * 100.0)
}

pub fn parse_memory_usage(content: &str) -> Result<f64, CollectError> {
    let mut rss = None;
    let mut size = None;
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            rss = Some(parse_status_kb(rest, "VmRSS")?);
        } else if let Some(rest) = line.strip_prefix("VmSize:") {
            size = Some(parse_status_kb(rest, "VmSize")?);
        }
    }

    let rss = rss.ok_or_else(|| CollectError::Parse("VmRSS not found in status".to_string()))?;
    let size =
        size.ok_or_else(|| CollectError::Parse("VmSize not found in status".to_string()))?;
    if size == 0 {
        return Err(CollectError::InvalidMetric(
            "total virtual memory is zero".to_string(),
        ));
    }
    Ok(rss as f64 / size as f64 * 100.0)
}

pub fn parse_load_averages(content: &str) -> Result<(f64, f64, f64), CollectError> {
    let fields: Vec<&str> = content.split_whitespace().collect();
    if fields.len() < 3 {
        return Err(CollectError::Parse(format!(
            "loadavg has {} fields, expected at least 3",
            fields.len()
        )));
    }
    Ok((
        parse_load(fields[0], "1-minute")?,
        parse_load(fields[1], "5-minute")?,
        parse_load(fields[2], "15-minute")?,
    ))
}

fn parse_status_kb(rest: &str, name: &str) -> Result<u64, CollectError> {
    // "   12345 kB"
    let value = rest
        .split_whitespace()
        .next()
        .ok_or_else(|| CollectError::Parse(format!("{name} has no value")))?;
    parse_u64(value, name)
}

fn parse_u64(value: &str, name: &str) -> Result<u64, CollectError> {
    value
        .parse::<u64>()
        .map_err(|err| CollectError::Parse(format!("{name} field {value:?}: {err}")))
}

fn parse_load(value: &str, name: &str) -> Result<f64, CollectError> {
    let parsed = value
        .parse::<f64>()
        .map_err(|err| CollectError::Parse(format!("{name} load {value:?}: {err}")))?;
    if !parsed.is_finite() || parsed < 0.0 {
        return Err(CollectError::Parse(format!(
            "{name} load {value:?} is not a valid average"
        )));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "cpu  4705 356 584 3699 23 23 0 0 0 0\n\
                        cpu0 1393 280 283 1119 4 8 0 0 0 0\n\
                        intr 114930548 113199788 3 0 5 263 0 4 [... lots more numbers ...]\n\
                        ctxt 1990473\n";

    #[test]
    fn cpu_usage_uses_user_nice_system_over_total() {
        let usage = parse_cpu_usage(STAT).unwrap();
        let expected = (4705.0 + 356.0 + 584.0) / (4705.0 + 356.0 + 584.0 + 3699.0) * 100.0;
        assert!((usage - expected).abs() < 1e-9);
        assert!((0.0..=100.0).contains(&usage));
    }

    #[test]
    fn cpu_line_must_be_aggregate() {
        let err = parse_cpu_usage("cpu0 1 2 3 4 5 6 7\n").unwrap_err();
        assert!(matches!(err, CollectError::Parse(_)));
    }

    #[test]
    fn cpu_line_with_too_few_fields_is_rejected() {
        let err = parse_cpu_usage("cpu  1 2 3 4 5 6\n").unwrap_err();
        assert!(matches!(err, CollectError::Parse(ref m) if m.contains("7 fields")));
    }

    #[test]
    fn cpu_non_numeric_field_is_rejected() {
        let err = parse_cpu_usage("cpu  1 x 3 4 5 6 7\n").unwrap_err();
        assert!(matches!(err, CollectError::Parse(ref m) if m.contains("nice")));
    }

    #[test]
    fn cpu_zero_total_is_invalid_metric() {
        let err = parse_cpu_usage("cpu  0 0 0 0 0 0 0\n").unwrap_err();
        assert!(matches!(err, CollectError::InvalidMetric(_)));
    }

    #[test]
    fn memory_usage_is_rss_over_vm_size() {
        let status = "Name:\tcat\nVmPeak:\t  9000 kB\nVmSize:\t    8000 kB\nVmRSS:\t     2000 kB\nThreads:\t1\n";
        let usage = parse_memory_usage(status).unwrap();
        assert!((usage - 25.0).abs() < 1e-9);
    }

    #[test]
    fn memory_missing_field_is_parse_error() {
        let err = parse_memory_usage("VmSize:\t8000 kB\n").unwrap_err();
        assert!(matches!(err, CollectError::Parse(ref m) if m.contains("VmRSS")));

        let err = parse_memory_usage("VmRSS:\t8000 kB\n").unwrap_err();
        assert!(matches!(err, CollectError::Parse(ref m) if m.contains("VmSize")));
    }

    #[test]
    fn memory_malformed_field_is_parse_error() {
        let err = parse_memory_usage("VmRSS:\n VmSize: 10 kB\n").unwrap_err();
        assert!(matches!(err, CollectError::Parse(_)));

        let err = parse_memory_usage("VmRSS:\tlots kB\nVmSize:\t10 kB\n").unwrap_err();
        assert!(matches!(err, CollectError::Parse(_)));
    }

    #[test]
    fn memory_zero_size_is_invalid_metric() {
        let err = parse_memory_usage("VmSize:\t0 kB\nVmRSS:\t0 kB\n").unwrap_err();
        assert!(matches!(err, CollectError::InvalidMetric(_)));
    }

    #[test]
    fn load_averages_take_first_three_fields() {
        let load = parse_load_averages("1.05 0.70 0.51 1/245 3371\n").unwrap();
        assert_eq!(load, (1.05, 0.70, 0.51));
    }

    #[test]
    fn load_averages_reject_malformed_input() {
        assert!(matches!(
            parse_load_averages("0.10 0.20"),
            Err(CollectError::Parse(_))
        ));
        assert!(matches!(
            parse_load_averages(""),
            Err(CollectError::Parse(_))
        ));
        assert!(matches!(
            parse_load_averages("0.10 abc 0.30"),
            Err(CollectError::Parse(_))
        ));
        assert!(matches!(
            parse_load_averages("NaN 0.20 0.30"),
            Err(CollectError::Parse(_))
        ));
    }
}
