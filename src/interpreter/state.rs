//! The single owning shell state: variables with their scope stack,
//! positional parameters, options, aliases, functions, traps, jobs, and
//! working-directory bookkeeping.
//!
//! Pipeline stages, subshells and command substitutions run against a
//! `clone()` of this state; their mutations never flow back.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::ast::FunctionDef;

use super::jobs::JobTable;
use super::options::{SetOptions, ShoptOptions};
use super::traps::TrapState;
use super::vars::{Attributes, Value, Variable};

pub const DEFAULT_IFS: &str = " \t\n";

#[derive(Debug, Clone)]
pub struct ShellState {
    /// Global scope.
    pub global: HashMap<String, Variable>,
    /// One frame per function invocation; `local` binds into the top frame.
    pub frames: Vec<HashMap<String, Variable>>,

    /// `$0`.
    pub script_name: String,
    /// `$1..$N`.
    pub positional: Vec<String>,

    /// `$?`.
    pub last_exit_code: i32,
    /// `$_`.
    pub last_arg: String,
    /// `$!`.
    pub last_background_pid: Option<u32>,
    /// `$PIPESTATUS`.
    pub pipe_status: Vec<i32>,
    /// `$LINENO`.
    pub current_line: usize,

    pub options: SetOptions,
    pub shopt: ShoptOptions,

    pub aliases: HashMap<String, String>,
    pub functions: HashMap<String, FunctionDef>,
    pub traps: TrapState,
    pub jobs: JobTable,

    pub cwd: PathBuf,
    pub previous_dir: PathBuf,

    /// `$PATH` lookup cache; cleared by `hash -r` and PATH assignment.
    pub path_cache: HashMap<String, PathBuf>,
    /// Builtins masked by `enable -n`.
    pub disabled_builtins: HashSet<String>,

    pub loop_depth: u32,
    pub call_depth: u32,
    pub source_depth: u32,
    /// Executing an `if`/`while`/`until` condition: errexit is exempt.
    pub in_condition: bool,

    pub interactive: bool,
    /// This state is a pipeline-stage / subshell clone.
    pub is_subshell: bool,

    /// For `$SECONDS`.
    pub start_time: Instant,
}

impl Default for ShellState {
    fn default() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        let mut state = Self {
            global: HashMap::new(),
            frames: Vec::new(),
            script_name: "den".to_string(),
            positional: Vec::new(),
            last_exit_code: 0,
            last_arg: String::new(),
            last_background_pid: None,
            pipe_status: Vec::new(),
            current_line: 1,
            options: SetOptions::default(),
            shopt: ShoptOptions::default(),
            aliases: HashMap::new(),
            functions: HashMap::new(),
            traps: TrapState::default(),
            jobs: JobTable::default(),
            previous_dir: cwd.clone(),
            cwd,
            path_cache: HashMap::new(),
            disabled_builtins: HashSet::new(),
            loop_depth: 0,
            call_depth: 0,
            source_depth: 0,
            in_condition: false,
            interactive: false,
            is_subshell: false,
            start_time: Instant::now(),
        };
        state.global.insert("IFS".to_string(), Variable::string(DEFAULT_IFS));
        state
    }
}

impl ShellState {
    /// Build the startup state from the process environment.
    pub fn from_env() -> Self {
        let mut state = Self::default();

        for (name, value) in std::env::vars() {
            state.global.insert(name, Variable::exported(value));
        }

        // Shell-maintained variables.
        let cwd_display = state.cwd.display().to_string();
        state.global.insert("PWD".to_string(), Variable::exported(cwd_display.clone()));
        state
            .global
            .entry("OLDPWD".to_string())
            .or_insert_with(|| Variable::exported(cwd_display));
        state.global.entry("IFS".to_string()).or_insert_with(|| Variable::string(DEFAULT_IFS));
        state.global.entry("PS1".to_string()).or_insert_with(|| Variable::string("\\u@\\h:\\w\\$ "));
        state.global.entry("PS2".to_string()).or_insert_with(|| Variable::string("> "));
        state
            .global
            .entry("HISTSIZE".to_string())
            .or_insert_with(|| Variable::string("500"));

        let shlvl = state
            .get_string("SHLVL")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0)
            + 1;
        state.global.insert("SHLVL".to_string(), Variable::exported(shlvl.to_string()));

        state
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Find a variable, innermost frame first. Namerefs are followed.
    pub fn lookup(&self, name: &str) -> Option<&Variable> {
        let name = self.resolve_nameref(name, 0)?;
        self.lookup_raw(&name)
    }

    fn lookup_raw(&self, name: &str) -> Option<&Variable> {
        for frame in self.frames.iter().rev() {
            if let Some(var) = frame.get(name) {
                return Some(var);
            }
        }
        self.global.get(name)
    }

    /// Follow nameref chains; returns the final variable name.
    fn resolve_nameref(&self, name: &str, depth: u8) -> Option<String> {
        if depth > 8 {
            return None;
        }
        match self.lookup_raw(name) {
            Some(var) if var.attrs.nameref => {
                let target = var.value.as_scalar()?.to_string();
                if target.is_empty() {
                    return Some(name.to_string());
                }
                self.resolve_nameref(&target, depth + 1)
            }
            _ => Some(name.to_string()),
        }
    }

    /// Scalar value of a variable, including the dynamic specials.
    pub fn get_string(&self, name: &str) -> Option<String> {
        match name {
            "RANDOM" => return Some((rand::random::<u32>() % 32768).to_string()),
            "SECONDS" => return Some(self.start_time.elapsed().as_secs().to_string()),
            "LINENO" => return Some(self.current_line.to_string()),
            "PIPESTATUS" => {
                return self.pipe_status.first().map(|s| s.to_string());
            }
            _ => {}
        }
        self.lookup(name).and_then(|v| v.value.as_scalar().map(|s| s.to_string()))
    }

    pub fn is_set(&self, name: &str) -> bool {
        matches!(name, "RANDOM" | "SECONDS" | "LINENO") || self.lookup(name).is_some()
    }

    pub fn ifs(&self) -> String {
        self.get_string("IFS").unwrap_or_else(|| DEFAULT_IFS.to_string())
    }

    // ------------------------------------------------------------------
    // Assignment
    // ------------------------------------------------------------------

    /// Assign a scalar. Readonly violations fail without mutating.
    pub fn set_string(&mut self, name: &str, value: String) -> Result<(), String> {
        let name = self
            .resolve_nameref(name, 0)
            .ok_or_else(|| format!("{}: circular name reference", name))?;
        let value = self.coerce_value(&name, value)?;

        if name == "PATH" {
            self.path_cache.clear();
        }

        let allexport = self.options.allexport;
        if let Some(var) = self.find_var_mut(&name) {
            if var.attrs.readonly {
                return Err(format!("{}: readonly variable", name));
            }
            let value = var.coerce_case(value);
            var.value = Value::String(value);
            if allexport {
                var.attrs.exported = true;
            }
            return Ok(());
        }

        let mut var = Variable::string(value);
        var.attrs.exported = allexport;
        self.global.insert(name, var);
        Ok(())
    }

    /// Append to a scalar (or arithmetically add under the integer
    /// attribute).
    pub fn append_string(&mut self, name: &str, value: String) -> Result<(), String> {
        let integer = self.lookup(name).map(|v| v.attrs.integer).unwrap_or(false);
        let current = self.get_string(name).unwrap_or_default();
        if integer {
            let current_n: i64 = current.parse().unwrap_or(0);
            let add_n = self.eval_integer(&value)?;
            return self.set_string(name, (current_n + add_n).to_string());
        }
        self.set_string(name, format!("{}{}", current, value))
    }

    /// Assign one array element.
    pub fn set_element(&mut self, name: &str, key: &str, value: String) -> Result<(), String> {
        let name = self
            .resolve_nameref(name, 0)
            .ok_or_else(|| format!("{}: circular name reference", name))?;
        let value = self.coerce_value(&name, value)?;

        // Create as an indexed array when absent.
        if self.find_var_mut(&name).is_none() {
            self.global.insert(
                name.clone(),
                Variable {
                    value: Value::Indexed(Default::default()),
                    attrs: Attributes::default(),
                },
            );
        }

        let key = key.to_string();
        let index = self.eval_integer(&key);
        let var = self.find_var_mut(&name).unwrap();
        if var.attrs.readonly {
            return Err(format!("{}: readonly variable", name));
        }
        let value = var.coerce_case(value);
        match &mut var.value {
            Value::Assoc(map) => {
                map.insert(key, value);
            }
            Value::Indexed(map) => {
                map.insert(index?, value);
            }
            Value::String(s) => {
                // Subscript assignment to a scalar promotes it.
                let mut map = std::collections::BTreeMap::new();
                map.insert(0, s.clone());
                map.insert(index?, value);
                var.value = Value::Indexed(map);
            }
        }
        Ok(())
    }

    /// Replace a variable with an indexed array.
    pub fn set_array(&mut self, name: &str, items: Vec<String>, append: bool) -> Result<(), String> {
        let name = self
            .resolve_nameref(name, 0)
            .ok_or_else(|| format!("{}: circular name reference", name))?;
        if let Some(var) = self.find_var_mut(&name) {
            if var.attrs.readonly {
                return Err(format!("{}: readonly variable", name));
            }
            match (&mut var.value, append) {
                (Value::Indexed(map), true) => {
                    let mut next = map.keys().max().map(|k| k + 1).unwrap_or(0);
                    for item in items {
                        map.insert(next, item);
                        next += 1;
                    }
                }
                (Value::Assoc(map), true) => {
                    // Appending a plain list to an associative array takes
                    // key/value pairs.
                    let mut iter = items.into_iter();
                    while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
                        map.insert(k, v);
                    }
                }
                (value, _) => *value = Value::indexed_from(items),
            }
            return Ok(());
        }
        self.global.insert(
            name,
            Variable { value: Value::indexed_from(items), attrs: Attributes::default() },
        );
        Ok(())
    }

    /// Bind into the top function frame (the `local` builtin).
    pub fn set_local(&mut self, name: &str, value: Option<String>) -> Result<(), String> {
        if let Some(existing) = self.lookup_raw(name) {
            if existing.attrs.readonly {
                return Err(format!("{}: readonly variable", name));
            }
        }
        let frame = match self.frames.last_mut() {
            Some(frame) => frame,
            None => return Err("local: can only be used in a function".to_string()),
        };
        let var = Variable::string(value.unwrap_or_default());
        frame.insert(name.to_string(), var);
        Ok(())
    }

    pub fn unset(&mut self, name: &str) -> Result<(), String> {
        if let Some(var) = self.lookup_raw(name) {
            if var.attrs.readonly {
                return Err(format!("{}: cannot unset: readonly variable", name));
            }
        }
        for frame in self.frames.iter_mut().rev() {
            if frame.remove(name).is_some() {
                return Ok(());
            }
        }
        self.global.remove(name);
        Ok(())
    }

    pub fn unset_element(&mut self, name: &str, key: &str) -> Result<(), String> {
        let index = self.eval_integer(key);
        if let Some(var) = self.find_var_mut(name) {
            if var.attrs.readonly {
                return Err(format!("{}: cannot unset: readonly variable", name));
            }
            match &mut var.value {
                Value::Indexed(map) => {
                    if let Ok(i) = index {
                        map.remove(&i);
                    }
                }
                Value::Assoc(map) => {
                    map.shift_remove(key);
                }
                Value::String(_) => {}
            }
        }
        Ok(())
    }

    /// Mutate attributes, creating the variable if needed.
    pub fn modify_attrs(
        &mut self,
        name: &str,
        apply: impl FnOnce(&mut Attributes),
    ) -> Result<(), String> {
        if self.find_var_mut(name).is_none() {
            self.global.insert(
                name.to_string(),
                Variable { value: Value::String(String::new()), attrs: Attributes::default() },
            );
        }
        let var = self.find_var_mut(name).unwrap();
        let was_readonly = var.attrs.readonly;
        apply(&mut var.attrs);
        if was_readonly && !var.attrs.readonly {
            // Readonly is permanent.
            var.attrs.readonly = true;
            return Err(format!("{}: readonly variable", name));
        }
        Ok(())
    }

    fn find_var_mut(&mut self, name: &str) -> Option<&mut Variable> {
        for frame in self.frames.iter_mut().rev() {
            if frame.contains_key(name) {
                return frame.get_mut(name);
            }
        }
        self.global.get_mut(name)
    }

    /// Integer-attribute coercion: evaluate the RHS arithmetically.
    fn coerce_value(&mut self, name: &str, value: String) -> Result<String, String> {
        let integer = self.lookup_raw(name).map(|v| v.attrs.integer).unwrap_or(false);
        if !integer {
            return Ok(value);
        }
        Ok(self.eval_integer(&value)?.to_string())
    }

    fn eval_integer(&mut self, text: &str) -> Result<i64, String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }
        if let Ok(n) = trimmed.parse::<i64>() {
            return Ok(n);
        }
        super::arithmetic::eval_text(self, trimmed).map_err(|e| e.to_string())
    }

    // ------------------------------------------------------------------
    // Environment and frames
    // ------------------------------------------------------------------

    /// The environment for spawned children: exported variables, innermost
    /// binding wins.
    pub fn exported_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        for (name, var) in &self.global {
            if var.attrs.exported {
                if let Some(value) = var.value.as_scalar() {
                    env.insert(name.clone(), value.to_string());
                }
            }
        }
        for frame in &self.frames {
            for (name, var) in frame {
                if var.attrs.exported {
                    if let Some(value) = var.value.as_scalar() {
                        env.insert(name.clone(), value.to_string());
                    }
                }
            }
        }
        env
    }

    /// Resolve a path against the shell's logical working directory.
    /// The process cwd is left alone so pipeline-stage clones stay
    /// isolated; every file access goes through this.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.cwd.join(p)
        }
    }

    /// Snapshot a variable for temporary-binding restore (`VAR=x cmd`).
    pub fn snapshot_var(&self, name: &str) -> Option<Variable> {
        self.lookup_raw(name).cloned()
    }

    /// Undo a temporary binding.
    pub fn restore_var(&mut self, name: &str, snapshot: Option<Variable>) {
        match snapshot {
            Some(var) => {
                if let Some(slot) = self.find_var_mut(name) {
                    *slot = var;
                } else {
                    self.global.insert(name.to_string(), var);
                }
            }
            None => {
                for frame in self.frames.iter_mut().rev() {
                    if frame.remove(name).is_some() {
                        return;
                    }
                }
                self.global.remove(name);
            }
        }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(HashMap::new());
        self.call_depth += 1;
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
        self.call_depth = self.call_depth.saturating_sub(1);
    }

    // ------------------------------------------------------------------
    // Positional parameters
    // ------------------------------------------------------------------

    pub fn positional_get(&self, index: usize) -> Option<&str> {
        if index == 0 {
            return Some(&self.script_name);
        }
        self.positional.get(index - 1).map(|s| s.as_str())
    }

    /// `shift [n]`; fails when n exceeds `$#`.
    pub fn shift_positional(&mut self, count: usize) -> bool {
        if count > self.positional.len() {
            return false;
        }
        self.positional.drain(..count);
        true
    }

    /// Record `$?` and `$PIPESTATUS` after a pipeline completes.
    pub fn commit_status(&mut self, status: i32, pipe_status: Vec<i32>) {
        self.last_exit_code = status;
        if !pipe_status.is_empty() {
            self.pipe_status = pipe_status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_set_get() {
        let mut state = ShellState::default();
        state.set_string("X", "1".to_string()).unwrap();
        assert_eq!(state.get_string("X"), Some("1".to_string()));
        assert!(state.is_set("X"));
        assert!(!state.is_set("Y"));
    }

    #[test]
    fn readonly_rejects_assignment() {
        let mut state = ShellState::default();
        state.set_string("X", "1".to_string()).unwrap();
        state.modify_attrs("X", |a| a.readonly = true).unwrap();
        assert!(state.set_string("X", "2".to_string()).is_err());
        assert_eq!(state.get_string("X"), Some("1".to_string()));
        assert!(state.unset("X").is_err());
    }

    #[test]
    fn frame_shadowing() {
        let mut state = ShellState::default();
        state.set_string("V", "global".to_string()).unwrap();
        state.push_frame();
        state.set_local("V", Some("local".to_string())).unwrap();
        assert_eq!(state.get_string("V"), Some("local".to_string()));
        state.pop_frame();
        assert_eq!(state.get_string("V"), Some("global".to_string()));
    }

    #[test]
    fn assignment_without_local_hits_outer_scope() {
        let mut state = ShellState::default();
        state.set_string("V", "0".to_string()).unwrap();
        state.push_frame();
        state.set_string("V", "1".to_string()).unwrap();
        state.pop_frame();
        assert_eq!(state.get_string("V"), Some("1".to_string()));
    }

    #[test]
    fn array_elements_and_promotion() {
        let mut state = ShellState::default();
        state.set_array("A", vec!["x".into(), "y".into()], false).unwrap();
        assert_eq!(state.get_string("A"), Some("x".to_string()));

        state.set_element("A", "5", "z".to_string()).unwrap();
        let var = state.lookup("A").unwrap();
        assert_eq!(var.value.elements(), vec!["x", "y", "z"]);

        // Scalar promotes on subscript assignment.
        state.set_string("S", "base".to_string()).unwrap();
        state.set_element("S", "1", "more".to_string()).unwrap();
        assert_eq!(state.lookup("S").unwrap().value.elements(), vec!["base", "more"]);
    }

    #[test]
    fn integer_attribute_evaluates() {
        let mut state = ShellState::default();
        state.modify_attrs("N", |a| a.integer = true).unwrap();
        state.set_string("N", "2 + 3".to_string()).unwrap();
        assert_eq!(state.get_string("N"), Some("5".to_string()));
    }

    #[test]
    fn nameref_follows_target() {
        let mut state = ShellState::default();
        state.set_string("real", "value".to_string()).unwrap();
        state.set_string("ref", "real".to_string()).unwrap();
        state.modify_attrs("ref", |a| a.nameref = true).unwrap();
        assert_eq!(state.get_string("ref"), Some("value".to_string()));

        state.set_string("ref", "changed".to_string()).unwrap();
        assert_eq!(state.get_string("real"), Some("changed".to_string()));
    }

    #[test]
    fn exported_env_collects_exports() {
        let mut state = ShellState::default();
        state.set_string("A", "1".to_string()).unwrap();
        state.set_string("B", "2".to_string()).unwrap();
        state.modify_attrs("B", |a| a.exported = true).unwrap();
        let env = state.exported_env();
        assert!(!env.contains_key("A"));
        assert_eq!(env.get("B"), Some(&"2".to_string()));
    }

    #[test]
    fn positional_shift() {
        let mut state = ShellState::default();
        state.positional = vec!["a".into(), "b".into(), "c".into()];
        assert!(state.shift_positional(2));
        assert_eq!(state.positional, vec!["c".to_string()]);
        assert!(!state.shift_positional(5));
    }

    #[test]
    fn path_assignment_clears_cache() {
        let mut state = ShellState::default();
        state.path_cache.insert("ls".to_string(), PathBuf::from("/bin/ls"));
        state.set_string("PATH", "/usr/bin".to_string()).unwrap();
        assert!(state.path_cache.is_empty());
    }
}
