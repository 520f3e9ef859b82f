#[cfg(test)]
mod tests {
    use crate::bench::{BenchError, Benchmark};

    const MIB: f64 = 1024.0 * 1024.0;

    #[test]
    fn test_summary_formula() {
        let mut bench = Benchmark::new();

        bench.add_iteration("write", 10_000, 20.0 * MIB, 10.0);
        bench.add_iteration("write", 10_000, 40.0 * MIB, 20.0);
        bench.add_iteration("write", 10_000, 60.0 * MIB, 30.0);
        bench.add_iteration("write", 10_000, 80.0 * MIB, 40.0);

        let summary = bench.summary("write");

        assert!((summary.max_bw - 8000.0).abs() < 1e-9);
        assert!((summary.min_bw - 2000.0).abs() < 1e-9);
        assert!((summary.mean_bw - 5000.0).abs() < 1e-9);
        assert!((summary.total_bytes - 200.0 * MIB).abs() < 1e-6);
        assert!((summary.total_ops - 100.0).abs() < 1e-9);
        assert_eq!(summary.iterations, 4);
    }

    #[test]
    fn test_bandwidth_is_bytes_per_microsecond_mib() {
        let mut bench = Benchmark::new();

        // 1 MiB in 1024 µs: 1048576 / 1024 / 1.024 / 1.024 ≈ 976.5625
        bench.add_iteration("io", 1024, MIB, 1.0);

        let summary = bench.summary("io");
        let expected = MIB / 1024.0 / 1.024 / 1.024;
        assert!((summary.min_bw - expected).abs() < 1e-9);
        assert_eq!(summary.min_bw, summary.max_bw);
        assert_eq!(summary.min_bw, summary.mean_bw);
    }

    #[test]
    fn test_summary_ignores_other_labels() {
        let mut bench = Benchmark::new();

        bench.add_iteration("read", 1000, MIB, 1.0);
        bench.add_iteration("write", 1000, 2.0 * MIB, 2.0);

        let summary = bench.summary("read");
        assert_eq!(summary.iterations, 1);
        assert!((summary.total_bytes - MIB).abs() < 1e-9);
    }

    #[test]
    fn test_summary_of_unknown_label_is_zeroed() {
        let bench = Benchmark::new();

        let summary = bench.summary("nothing");
        assert_eq!(summary.iterations, 0);
        assert_eq!(summary.total_bytes, 0.0);
        assert_eq!(summary.mean_bw, 0.0);
    }

    #[test]
    fn test_format_summary_line() {
        let mut bench = Benchmark::new();

        bench.add_iteration("write", 10_000, 20.0 * MIB, 10.0);
        bench.add_iteration("write", 10_000, 80.0 * MIB, 40.0);

        let line = bench.format_summary("write", None);
        assert_eq!(line, "write,8000.00,2000.00,5000.00,100.00,50,2\n");

        let aliased = bench.format_summary("write", Some("w-total"));
        assert!(aliased.starts_with("w-total,"));
    }

    #[test]
    fn test_format_summary_failed_when_no_bytes() {
        let bench = Benchmark::new();
        assert_eq!(bench.format_summary("ghost", None), "ghost, FAILED\n");
    }

    #[test]
    fn test_format_summary_empty_label_returns_header() {
        let bench = Benchmark::new();
        let header = bench.format_summary("", None);
        assert!(header.starts_with("access,max(MiB/s)"));
        assert_eq!(header.lines().count(), 2);
    }

    #[test]
    fn test_format_iterations_one_line_each() {
        let mut bench = Benchmark::new();

        bench.add_iteration("io", 10_000, 20.0 * MIB, 10.0);
        bench.add_iteration("io", 10_000, 40.0 * MIB, 20.0);

        let report = bench.format_iterations("io");
        let lines: Vec<_> = report.lines().collect();
        assert_eq!(lines.len(), 4); // 2 header + 2 data
        assert_eq!(lines[2], "io,2000.00,2000.00,2000.00,20.00,10,1");
        assert_eq!(lines[3], "io,4000.00,4000.00,4000.00,40.00,20,1");
    }

    #[test]
    fn test_clock_misuse_is_reported() {
        let mut bench = Benchmark::new();

        assert_eq!(bench.stop(false), Err(BenchError::NotStarted));
        assert_eq!(bench.sofar().unwrap_err(), BenchError::NotStarted);

        bench.start().unwrap();
        assert_eq!(bench.start(), Err(BenchError::AlreadyStarted));
        assert_eq!(bench.duration().unwrap_err(), BenchError::StillRunning);

        bench.stop(false).unwrap();
        assert!(bench.duration().unwrap() >= 0);

        // Idempotent stop swallows the second stop.
        bench.stop(true).unwrap();
        assert_eq!(bench.stop(false), Err(BenchError::NotStarted));
    }

    #[test]
    fn test_clock_measures_elapsed_time() {
        let mut bench = Benchmark::new();

        bench.start().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(bench.sofar().unwrap() >= 10_000);
        bench.stop(false).unwrap();

        assert!(bench.duration().unwrap() >= 10_000);
    }

    #[test]
    fn test_clear_discards_iterations() {
        let mut bench = Benchmark::new();

        bench.add_iteration("io", 1000, MIB, 1.0);
        bench.clear();

        assert_eq!(bench.summary("io").iterations, 0);
    }
}
