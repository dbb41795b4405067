//! Synthetic backends for the simulator.

pub mod reporter;

use std::net::SocketAddr;
use std::str::FromStr;

use wrr_core::LoadReport;

/// A simulated backend: where it lives and the load it reports.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSpec {
    /// Address the backend is registered under.
    pub address: SocketAddr,
    /// Baseline load; the reporter adds jitter on every report.
    pub load: LoadReport,
}

impl FromStr for BackendSpec {
    type Err = String;

    /// Parse `ADDR=QPS:UTILIZATION[:EPS]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, load) = s
            .split_once('=')
            .ok_or_else(|| format!("expected ADDR=QPS:UTILIZATION[:EPS], got `{s}`"))?;
        let address = address
            .parse()
            .map_err(|err| format!("invalid address `{address}`: {err}"))?;

        let fields = load
            .split(':')
            .map(|f| f.parse::<f64>().map_err(|err| format!("invalid number `{f}`: {err}")))
            .collect::<Result<Vec<_>, _>>()?;
        let load = match fields[..] {
            [qps, utilization] => LoadReport {
                qps,
                eps: 0.0,
                utilization,
            },
            [qps, utilization, eps] => LoadReport {
                qps,
                eps,
                utilization,
            },
            _ => return Err(format!("expected QPS:UTILIZATION[:EPS], got `{load}`")),
        };
        load.weight(1.0).map_err(|err| err.to_string())?;

        Ok(Self { address, load })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_without_errors() {
        let spec: BackendSpec = "127.0.0.1:9001=300:0.5".parse().unwrap();
        assert_eq!(spec.address, "127.0.0.1:9001".parse::<SocketAddr>().unwrap());
        assert_eq!(
            spec.load,
            LoadReport {
                qps: 300.0,
                eps: 0.0,
                utilization: 0.5
            }
        );
    }

    #[test]
    fn parses_error_rate() {
        let spec: BackendSpec = "[::1]:9002=100:0.25:10".parse().unwrap();
        assert_eq!(spec.load.eps, 10.0);
    }

    #[test]
    fn rejects_malformed_specs() {
        for input in [
            "127.0.0.1:9001",
            "nope=1:1",
            "127.0.0.1:9001=abc:0.5",
            "127.0.0.1:9001=100",
            "127.0.0.1:9001=100:0.5:1:2",
            "127.0.0.1:9001=0:0.5",
        ] {
            assert!(input.parse::<BackendSpec>().is_err(), "{input} parsed");
        }
    }
}
