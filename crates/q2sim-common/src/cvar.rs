// cvar.rs - named configuration variables
//
// The registry is owned by whoever runs the simulation (normally the
// server) and handed around by reference; there is no global instance.

use std::collections::HashMap;

use bitflags::bitflags;
use log::{info, warn};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CvarFlags: u32 {
        /// saved to the config file
        const ARCHIVE = 1;
        /// sent to the server on connect and change
        const USERINFO = 2;
        /// sent in response to front end requests
        const SERVERINFO = 4;
        /// only settable from the command line
        const NOSET = 8;
        /// held until the next level load
        const LATCH = 16;
    }
}

#[derive(Debug, Clone)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub latched_string: Option<String>,
    pub flags: CvarFlags,
    pub modified: bool,
    pub value: f32,
}

/// Index of a variable inside its `CvarContext`. Stable for the lifetime
/// of the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CvarHandle(usize);

#[derive(Debug, Default)]
pub struct CvarContext {
    vars: Vec<Cvar>,
    index: HashMap<String, usize>,
    /// latched variables only change between levels while this is set
    pub server_active: bool,
    pub userinfo_modified: bool,
}

fn info_validate(s: &str) -> bool {
    !s.contains('\\') && !s.contains('"') && !s.contains(';')
}

fn parse_value(s: &str) -> f32 {
    s.trim().parse::<f32>().unwrap_or(0.0)
}

impl CvarContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.index.get(name).map(|&i| &self.vars[i])
    }

    pub fn handle(&self, name: &str) -> Option<CvarHandle> {
        self.index.get(name).copied().map(CvarHandle)
    }

    pub fn var(&self, h: CvarHandle) -> &Cvar {
        &self.vars[h.0]
    }

    pub fn value(&self, h: CvarHandle) -> f32 {
        self.vars[h.0].value
    }

    /// 0.0 for unknown variables.
    pub fn variable_value(&self, name: &str) -> f32 {
        self.find_var(name).map_or(0.0, |v| v.value)
    }

    /// Empty for unknown variables.
    pub fn variable_string(&self, name: &str) -> &str {
        self.find_var(name).map_or("", |v| v.string.as_str())
    }

    /// Returns the variable, creating it with `value` if it does not exist.
    /// An existing variable keeps its value and gains `flags`.
    pub fn get(&mut self, name: &str, value: &str, flags: CvarFlags) -> Option<CvarHandle> {
        let info = flags.intersects(CvarFlags::USERINFO | CvarFlags::SERVERINFO);
        if info && !info_validate(name) {
            warn!("invalid info cvar name");
            return None;
        }

        if let Some(&idx) = self.index.get(name) {
            self.vars[idx].flags |= flags;
            return Some(CvarHandle(idx));
        }

        if info && !info_validate(value) {
            warn!("invalid info cvar value");
            return None;
        }

        let idx = self.vars.len();
        self.vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            latched_string: None,
            flags,
            modified: true,
            value: parse_value(value),
        });
        self.index.insert(name.to_string(), idx);
        Some(CvarHandle(idx))
    }

    fn set2(&mut self, name: &str, value: &str, force: bool) -> Option<CvarHandle> {
        let Some(&idx) = self.index.get(name) else {
            return self.get(name, value, CvarFlags::empty());
        };
        let server_active = self.server_active;
        let var = &mut self.vars[idx];

        if var.flags.intersects(CvarFlags::USERINFO | CvarFlags::SERVERINFO)
            && !info_validate(value)
        {
            warn!("invalid info cvar value");
            return Some(CvarHandle(idx));
        }

        if force {
            var.latched_string = None;
        } else {
            if var.flags.contains(CvarFlags::NOSET) {
                info!("{} is write protected.", name);
                return Some(CvarHandle(idx));
            }

            if var.flags.contains(CvarFlags::LATCH) {
                let current = var.latched_string.as_deref().unwrap_or(&var.string);
                if value == current {
                    return Some(CvarHandle(idx));
                }
                if server_active {
                    info!("{} will be changed for next game.", name);
                    var.latched_string = Some(value.to_string());
                } else {
                    var.string = value.to_string();
                    var.value = parse_value(value);
                }
                return Some(CvarHandle(idx));
            }
        }

        if value == var.string {
            return Some(CvarHandle(idx));
        }

        var.modified = true;
        if var.flags.contains(CvarFlags::USERINFO) {
            self.userinfo_modified = true;
        }
        var.string = value.to_string();
        var.value = parse_value(value);
        Some(CvarHandle(idx))
    }

    /// Respects NOSET and LATCH.
    pub fn set(&mut self, name: &str, value: &str) -> Option<CvarHandle> {
        self.set2(name, value, false)
    }

    /// Ignores NOSET and LATCH.
    pub fn force_set(&mut self, name: &str, value: &str) -> Option<CvarHandle> {
        self.set2(name, value, true)
    }

    /// Replaces value and flags unconditionally.
    pub fn full_set(&mut self, name: &str, value: &str, flags: CvarFlags) -> Option<CvarHandle> {
        let Some(&idx) = self.index.get(name) else {
            return self.get(name, value, flags);
        };
        let var = &mut self.vars[idx];
        var.modified = true;
        if var.flags.contains(CvarFlags::USERINFO) {
            self.userinfo_modified = true;
        }
        var.string = value.to_string();
        var.value = parse_value(value);
        var.flags = flags;
        Some(CvarHandle(idx))
    }

    pub fn set_value(&mut self, name: &str, value: f32) {
        let s = if value == (value as i32) as f32 {
            format!("{}", value as i32)
        } else {
            format!("{}", value)
        };
        self.set(name, &s);
    }

    /// Applies pending latched values. Called at level load.
    pub fn get_latched_vars(&mut self) {
        for var in &mut self.vars {
            if let Some(latched) = var.latched_string.take() {
                var.value = parse_value(&latched);
                var.string = latched;
                var.modified = true;
            }
        }
    }

    /// Returns and clears the modified flag.
    pub fn take_modified(&mut self, h: CvarHandle) -> bool {
        std::mem::replace(&mut self.vars[h.0].modified, false)
    }

    /// Applies `+set name value` triples from the command line and returns
    /// the remaining `+command args` groups, one string per group.
    pub fn apply_command_line<S: AsRef<str>>(&mut self, args: &[S]) -> Vec<String> {
        let mut commands = Vec::new();
        let mut i = 0;
        while i < args.len() {
            let arg = args[i].as_ref();
            if arg == "+set" && i + 2 < args.len() {
                let name = args[i + 1].as_ref();
                let value = args[i + 2].as_ref();
                // command line values may override write protection
                if self.find_var(name).is_some_and(|v| v.flags.contains(CvarFlags::NOSET)) {
                    self.force_set(name, value);
                } else {
                    self.set(name, value);
                }
                i += 3;
                continue;
            }
            if let Some(cmd) = arg.strip_prefix('+') {
                let mut line = cmd.to_string();
                i += 1;
                while i < args.len() && !args[i].as_ref().starts_with('+') {
                    line.push(' ');
                    line.push_str(args[i].as_ref());
                    i += 1;
                }
                commands.push(line);
                continue;
            }
            i += 1;
        }
        commands
    }

    /// `\key\value` pairs for every variable carrying `flag`.
    pub fn bit_info(&self, flag: CvarFlags) -> String {
        let mut out = String::new();
        for var in self.vars.iter().filter(|v| v.flags.contains(flag)) {
            out.push('\\');
            out.push_str(&var.name);
            out.push('\\');
            out.push_str(&var.string);
        }
        out
    }

    pub fn serverinfo(&self) -> String {
        self.bit_info(CvarFlags::SERVERINFO)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cvar> {
        self.vars.iter()
    }
}
