// common.rs -- command line handling shared by the jdlevel tools

use tracing::debug;

use crate::cvar::{CvarContext, CvarFlags};

pub const MAX_NUM_ARGVS: usize = 50;

/// Distribution name and version (for banners and version strings).
pub const DISTNAME: &str = "jdlevel";
pub const DISTVER: &str = env!("CARGO_PKG_VERSION");

// ============================================================
// ComArgs
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct ComArgs {
    pub argc: usize,
    pub argv: Vec<String>,
}

impl ComArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&mut self, args: &[String]) {
        self.argc = args.len().min(MAX_NUM_ARGVS);
        self.argv = args[..self.argc].to_vec();
    }

    pub fn com_argc(&self) -> usize {
        self.argc
    }

    pub fn com_argv(&self, arg: usize) -> &str {
        if arg >= self.argc {
            ""
        } else {
            &self.argv[arg]
        }
    }

    pub fn com_clear_argv(&mut self, arg: usize) {
        if arg < self.argc {
            self.argv[arg] = String::new();
        }
    }

    /// Apply every `+set <name> <value>` triple to `cvars` and clear the
    /// consumed argv entries. Returns the number of variables set.
    pub fn add_early_commands(&mut self, cvars: &mut CvarContext) -> usize {
        let mut count = 0;
        let mut i = 0;
        while i < self.argc {
            if self.com_argv(i) != "+set" {
                i += 1;
                continue;
            }
            let name = self.com_argv(i + 1).to_string();
            let value = self.com_argv(i + 2).to_string();
            if !name.is_empty() {
                debug!(cvar = %name, value = %value, "command line override");
                let idx = cvars.set(&name, &value);
                cvars.cvar_vars[idx].flags |= CvarFlags::USERSET;
                count += 1;
            }
            self.com_clear_argv(i);
            self.com_clear_argv(i + 1);
            self.com_clear_argv(i + 2);
            i += 3;
        }
        count
    }

    /// Non-empty arguments after argv[0], in order. Call after
    /// `add_early_commands` so `+set` triples are already consumed.
    pub fn positional(&self) -> Vec<&str> {
        (1..self.argc)
            .map(|i| self.com_argv(i))
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> ComArgs {
        let owned: Vec<String> = list.iter().map(|s| s.to_string()).collect();
        let mut a = ComArgs::new();
        a.init(&owned);
        a
    }

    #[test]
    fn test_argv_out_of_range_is_empty() {
        let a = args(&["jdlevel"]);
        assert_eq!(a.com_argc(), 1);
        assert_eq!(a.com_argv(0), "jdlevel");
        assert_eq!(a.com_argv(5), "");
    }

    #[test]
    fn test_early_commands_set_cvars() {
        let mut a = args(&["jdlevel", "+set", "tess_level", "4", "maps/dm1.map", "+set", "game", "baseq3"]);
        let mut cvars = CvarContext::new();
        cvars.get("tess_level", Some("8"), CvarFlags::empty());

        assert_eq!(a.add_early_commands(&mut cvars), 2);
        assert_eq!(cvars.variable_value("tess_level"), 4.0);
        assert_eq!(cvars.variable_string("game"), "baseq3");
        assert!(cvars.find_var("game").unwrap().flags.contains(CvarFlags::USERSET));
        assert_eq!(a.positional(), vec!["maps/dm1.map"]);
    }

    #[test]
    fn test_truncated_set_is_ignored() {
        let mut a = args(&["jdlevel", "+set"]);
        let mut cvars = CvarContext::new();
        assert_eq!(a.add_early_commands(&mut cvars), 0);
        assert!(a.positional().is_empty());
    }

    #[test]
    fn test_argc_is_capped() {
        let many: Vec<String> = (0..MAX_NUM_ARGVS + 10).map(|i| i.to_string()).collect();
        let mut a = ComArgs::new();
        a.init(&many);
        assert_eq!(a.com_argc(), MAX_NUM_ARGVS);
    }
}
