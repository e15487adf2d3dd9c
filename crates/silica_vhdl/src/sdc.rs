//! SDC side-file generation for clock-domain crossings.
//!
//! Every crossing marker contributes a path constraint between its driver
//! and its output signal, using the marker's skew/delay parameters.

use crate::entity::SdcConstraint;
use std::fmt::Write as _;

/// Renders the SDC constraint file contents.
pub(crate) fn render_sdc(constraints: &[SdcConstraint]) -> String {
    let mut out = String::new();
    out.push_str("# Auto-generated clock-domain-crossing constraints.\n");
    for c in constraints {
        let _ = writeln!(out, "\n# crossing in entity '{}'", c.entity);
        if c.param.is_gray_coded == Some(true) {
            out.push_str("# bus is gray coded\n");
        }
        if let Some(max_skew) = c.param.max_skew {
            let _ = writeln!(
                out,
                "set_max_skew -from [get_registers {{{}*}}] -to [get_registers {{{}*}}] {max_skew}",
                c.src, c.dst
            );
        }
        if let Some(net_delay) = c.param.net_delay {
            let _ = writeln!(
                out,
                "set_net_delay -from [get_pins {{{}*}}] -to [get_pins {{{}*}}] -max {net_delay}",
                c.src, c.dst
            );
        }
        if c.param.max_skew.is_none() && c.param.net_delay.is_none() {
            let _ = writeln!(
                out,
                "set_false_path -from [get_registers {{{}*}}] -to [get_registers {{{}*}}]",
                c.src, c.dst
            );
        }
    }
    out
}
