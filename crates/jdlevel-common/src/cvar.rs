// cvar.rs -- named configuration variables for the level compiler
//
// Every tunable of the compile pipeline is a cvar: it is registered with a
// default by whoever consumes it, and may be overridden from the command
// line with `+set <name> <value>` before compilation starts.

use std::collections::HashMap;

use tracing::{info, warn};

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct CvarFlags: u32 {
        /// Cannot be changed with `set`.
        const NOSET   = 0x01;
        /// Value came from the command line rather than a default.
        const USERSET = 0x02;
    }
}

/// A configuration variable.
#[derive(Debug, Clone)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub flags: CvarFlags,
    pub modified: bool,
    pub value: f32,
}

/// The full cvar context.
#[derive(Debug, Default)]
pub struct CvarContext {
    pub cvar_vars: Vec<Cvar>,
    /// O(1) cvar lookup by name -> index in cvar_vars
    cvar_index: HashMap<String, usize>,
}

impl CvarContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a cvar by name, returning its index. O(1) via HashMap.
    pub fn find_var_index(&self, name: &str) -> Option<usize> {
        self.cvar_index.get(name).copied()
    }

    /// Find a cvar by name. O(1) via HashMap.
    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.cvar_index.get(name).map(|&idx| &self.cvar_vars[idx])
    }

    /// Get the floating-point value of a cvar. Returns 0 if not found.
    pub fn variable_value(&self, name: &str) -> f32 {
        match self.find_var(name) {
            Some(var) => var.value,
            None => 0.0,
        }
    }

    /// Get the string value of a cvar. Returns "" if not found.
    pub fn variable_string(&self, name: &str) -> &str {
        match self.find_var(name) {
            Some(var) => &var.string,
            None => "",
        }
    }

    /// Get or create a cvar. If it already exists, the value is not changed
    /// but flags are OR'd in. Returns `None` only when the cvar does not
    /// exist and no default was given.
    pub fn get(&mut self, name: &str, value: Option<&str>, flags: CvarFlags) -> Option<usize> {
        if let Some(&idx) = self.cvar_index.get(name) {
            self.cvar_vars[idx].flags |= flags;
            return Some(idx);
        }

        let value = value?;
        let idx = self.cvar_vars.len();
        self.cvar_vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            flags,
            modified: true,
            value: parse_value(value),
        });
        self.cvar_index.insert(name.to_string(), idx);

        Some(idx)
    }

    /// Set a cvar value, creating it when missing. NOSET cvars are left alone.
    pub fn set(&mut self, name: &str, value: &str) -> usize {
        let idx = match self.find_var_index(name) {
            Some(idx) => idx,
            None => {
                let idx = self.cvar_vars.len();
                self.get(name, Some(value), CvarFlags::empty());
                return idx;
            }
        };

        if self.cvar_vars[idx].flags.contains(CvarFlags::NOSET) {
            warn!("{} is write protected.", name);
            return idx;
        }

        let var = &mut self.cvar_vars[idx];
        if value == var.string {
            return idx; // not changed
        }

        var.modified = true;
        var.string = value.to_string();
        var.value = parse_value(value);

        idx
    }

    /// Log every cvar with its flags, returns the number listed.
    pub fn list(&self) -> usize {
        for var in &self.cvar_vars {
            let user = if var.flags.contains(CvarFlags::USERSET) { 'U' } else { ' ' };
            let noset = if var.flags.contains(CvarFlags::NOSET) { '-' } else { ' ' };
            info!("{}{} {} \"{}\"", user, noset, var.name, var.string);
        }
        self.cvar_vars.len()
    }
}

/// Non-numeric strings evaluate to 0, like atof.
fn parse_value(s: &str) -> f32 {
    s.trim().parse::<f32>().unwrap_or(0.0)
}
