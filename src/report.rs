// Summary of one attack run, as printed by the demo binaries.

use std::{fmt, process::ExitCode, time::Duration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackReport {
    pub attack: &'static str,
    pub key_bits: u64,
    pub recovered: String,
    pub queries: u64,
    pub elapsed: Duration,
    pub success: bool,
}

impl AttackReport {
    pub fn exit_code(&self) -> ExitCode {
        if self.success {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

impl fmt::Display for AttackReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "attack:    {}", self.attack)?;
        writeln!(f, "key size:  {} bits", self.key_bits)?;
        writeln!(f, "recovered: {}", self.recovered)?;
        writeln!(f, "queries:   {}", self.queries)?;
        writeln!(f, "elapsed:   {:.3?}", self.elapsed)?;
        write!(f, "success:   {}", self.success)
    }
}
