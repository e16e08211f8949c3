//! Device argument resolution
//!
//! Some front ends need their master clock rate pinned at creation time.
//! When the caller gives no arguments the first supported model found is
//! picked; when the caller names a model its clock rate is filled in.

/// Name reported for B200-family devices
pub const DEVNAME_B200: &str = "uhd_b200";
/// Name reported for X300-family devices
pub const DEVNAME_X300: &str = "uhd_x300";
/// Name reported when the model could not be determined
pub const DEVNAME_UNKNOWN: &str = "uhd_unknown";

const B200_CLOCK: &str = "master_clock_rate=30.72e6";
const X300_CLOCK: &str = "master_clock_rate=184.32e6";

/// Arguments after model defaults have been applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArgs {
    /// Argument string passed to the device factory
    pub args: String,
    /// Model name, when known before the device is made
    pub devname: Option<&'static str>,
    /// Whether the master clock rate may be changed after open
    pub dynamic_rate: bool,
}

/// Apply model defaults to `args` given the devices `found` by discovery
pub fn resolve(args: &str, found: &[String]) -> ResolvedArgs {
    let any_found = |needle: &str| found.iter().any(|d| d.contains(needle));

    if args.is_empty() {
        if any_found("type=b200") {
            return ResolvedArgs {
                args: format!("type=b200,{B200_CLOCK}"),
                devname: Some(DEVNAME_B200),
                dynamic_rate: true,
            };
        }
        if any_found("type=x300") {
            return ResolvedArgs {
                args: format!("type=x300,{X300_CLOCK}"),
                devname: Some(DEVNAME_X300),
                dynamic_rate: false,
            };
        }
    } else if args.contains("type=x300") && !args.contains("master_clock_rate") {
        return ResolvedArgs {
            args: format!("{args},{X300_CLOCK}"),
            devname: Some(DEVNAME_X300),
            dynamic_rate: false,
        };
    } else if args.contains("type=b200") {
        return ResolvedArgs {
            args: format!("{args},{B200_CLOCK}"),
            devname: Some(DEVNAME_B200),
            dynamic_rate: true,
        };
    }

    ResolvedArgs {
        args: args.to_string(),
        devname: None,
        dynamic_rate: true,
    }
}

/// Model name from the motherboard name reported by an open device
pub fn devname_from_mboard(mboard: &str) -> &'static str {
    if mboard.contains("B2") {
        DEVNAME_B200
    } else if mboard.contains("X3") {
        DEVNAME_X300
    } else {
        DEVNAME_UNKNOWN
    }
}

/// Clock source selected in the arguments, if any
pub fn clock_source(args: &str) -> Option<&'static str> {
    if args.contains("clock=external") {
        Some("external")
    } else if args.contains("clock=gpsdo") {
        Some("gpsdo")
    } else {
        None
    }
}

/// Whether the open-time banner should be suppressed
pub fn is_silent(args: &str) -> bool {
    args.contains("silent")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_args_prefers_b200() {
        let r = resolve("", &found(&["type=x300,addr=1", "type=b200,serial=A"]));
        assert_eq!(r.args, "type=b200,master_clock_rate=30.72e6");
        assert_eq!(r.devname, Some(DEVNAME_B200));
        assert!(r.dynamic_rate);
    }

    #[test]
    fn test_empty_args_falls_back_to_x300() {
        let r = resolve("", &found(&["type=x300,addr=192.168.40.2"]));
        assert_eq!(r.args, "type=x300,master_clock_rate=184.32e6");
        assert_eq!(r.devname, Some(DEVNAME_X300));
        assert!(!r.dynamic_rate);
    }

    #[test]
    fn test_empty_args_nothing_found() {
        let r = resolve("", &[]);
        assert_eq!(r.args, "");
        assert_eq!(r.devname, None);
        assert!(r.dynamic_rate);
    }

    #[test]
    fn test_explicit_x300_gets_clock() {
        let r = resolve("type=x300,addr=1", &[]);
        assert_eq!(r.args, "type=x300,addr=1,master_clock_rate=184.32e6");
        assert!(!r.dynamic_rate);

        // An explicit clock rate is left alone
        let r = resolve("type=x300,master_clock_rate=200e6", &[]);
        assert_eq!(r.args, "type=x300,master_clock_rate=200e6");
        assert_eq!(r.devname, None);
        assert!(r.dynamic_rate);
    }

    #[test]
    fn test_explicit_b200_gets_clock() {
        let r = resolve("type=b200,serial=F00", &[]);
        assert_eq!(r.args, "type=b200,serial=F00,master_clock_rate=30.72e6");
        assert_eq!(r.devname, Some(DEVNAME_B200));
    }

    #[test]
    fn test_other_args_pass_through() {
        let r = resolve("serial=1234", &found(&["type=b200"]));
        assert_eq!(r.args, "serial=1234");
        assert_eq!(r.devname, None);
    }

    #[test]
    fn test_devname_from_mboard() {
        assert_eq!(devname_from_mboard("B210"), DEVNAME_B200);
        assert_eq!(devname_from_mboard("X310"), DEVNAME_X300);
        assert_eq!(devname_from_mboard("N210r4"), DEVNAME_UNKNOWN);
    }

    #[test]
    fn test_clock_source_and_silent() {
        assert_eq!(clock_source("type=b200,clock=external"), Some("external"));
        assert_eq!(clock_source("clock=gpsdo"), Some("gpsdo"));
        assert_eq!(clock_source("type=b200"), None);
        assert!(is_silent("type=b200,silent"));
        assert!(!is_silent("type=b200"));
    }
}
