//! Replay one window of ticks against a personal baseline and print the sample

fn main() {
    let baseline = r#"{
        "sdnn": { "mean": 55.0, "std": 8.0 },
        "rmssd": { "mean": 42.0, "std": 6.0 },
        "heart_rate": { "mean": 80.0, "std": 10.0 },
        "object_temp": { "mean": 34.0, "std": 0.5 },
        "measurement_count": 120
    }"#;

    let ticks: Vec<String> = (0..10)
        .map(|i| {
            let hr = if i % 2 == 0 { 78.0 } else { 82.0 };
            let timestamp_ms = 1_700_000_000_000i64 + i * 1000;
            format!(
                r#"{{
                    "timestamp_ms": {timestamp_ms},
                    "heart_rate_bpm": {hr},
                    "ibi_ms": [740, 750, 800, 790, 810, 880],
                    "object_temp_c": 34.0
                }}"#
            )
        })
        .collect();
    let json = format!("[{}]", ticks.join(","));

    match pulse_relay::ticks_json_to_samples(&json, Some(baseline)) {
        Ok(samples) => samples.iter().for_each(|s| println!("{s}")),
        Err(e) => eprintln!("Error: {e:?}"),
    }
}
