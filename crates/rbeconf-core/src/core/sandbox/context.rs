/// Working directory and environment overlay applied to one `exec` call.
///
/// Contexts are values: deriving a child never changes the parent, so a stage
/// that narrows the context for its own commands cannot leak it to the next.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecContext {
    workdir: Option<String>,
    env: Vec<(String, String)>,
}

impl ExecContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn workdir(&self) -> Option<&str> {
        self.workdir.as_deref()
    }

    #[must_use]
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    #[must_use]
    pub fn with_workdir(&self, dir: impl Into<String>) -> Self {
        Self {
            workdir: Some(dir.into()),
            env: self.env.clone(),
        }
    }

    /// Overlays `pairs` on the current environment. A key that is already set
    /// keeps its position and takes the new value; new keys are appended.
    #[must_use]
    pub fn with_env<I, K, V>(&self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut env = self.env.clone();
        for (key, value) in pairs {
            let key = key.into();
            let value = value.into();
            match env.iter_mut().find(|(existing, _)| *existing == key) {
                Some(slot) => slot.1 = value,
                None => env.push((key, value)),
            }
        }
        Self {
            workdir: self.workdir.clone(),
            env,
        }
    }

    /// `-w` and `-e` flags for the container engine's `exec` subcommand.
    #[must_use]
    pub fn exec_flags(&self) -> Vec<String> {
        let mut flags = Vec::with_capacity(2 + self.env.len() * 2);
        if let Some(dir) = self.workdir.as_deref().filter(|dir| !dir.is_empty()) {
            flags.push("-w".to_string());
            flags.push(dir.to_string());
        }
        for (key, value) in &self.env {
            flags.push("-e".to_string());
            flags.push(format!("{key}={value}"));
        }
        flags
    }
}
