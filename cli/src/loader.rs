use std::{
    cell::RefCell,
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    rc::Rc,
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use starling_core::{FileOptions, Program, StringDict, Thread, eval::compile_source, vm::decode_program};
use tracing::debug;

use crate::sanitize_path;

/// Extension of encoded programs written by `starling compile`.
pub const COMPILED_EXTENSION: &str = "slb";

/// Reads `path` and turns it into a program: `.slb` files are decoded,
/// anything else is compiled from source.
pub fn load_program(path: &Path, options: FileOptions) -> Result<Program> {
    if path.extension().is_some_and(|ext| ext == COMPILED_EXTENSION) {
        let bytes = fs::read(path).with_context(|| format!("Failed to read '{}'", path.display()))?;
        return decode_program(&bytes).with_context(|| format!("Failed to decode '{}'", path.display()));
    }
    let src = fs::read_to_string(path).with_context(|| format!("Failed to read '{}'", path.display()))?;
    compile_source(&path.to_string_lossy(), &src, options, &|_| false)
}

/// Prints to stdout, one line per `print` call.
pub fn stdout_thread(options: FileOptions) -> Thread {
    let mut thread = Thread::new(options);
    thread.set_print(|msg| println!("{msg}"));
    thread
}

/// Resolves `load` statements against files below one directory.
///
/// Each module is executed at most once, on a thread of its own, and its
/// frozen globals are shared by every file that loads it. A module that is
/// still executing when it is loaded again is part of a cycle.
#[derive(Clone)]
pub struct ModuleLoader {
    state: Rc<RefCell<LoaderState>>,
}

struct LoaderState {
    base_dir: PathBuf,
    options: FileOptions,
    // `None` while the module is executing.
    modules: HashMap<PathBuf, Option<StringDict>>,
}

impl ModuleLoader {
    pub fn new(base_dir: Option<&Path>, options: FileOptions) -> Self {
        let base_dir = base_dir
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            state: Rc::new(RefCell::new(LoaderState {
                base_dir,
                options,
                modules: HashMap::new(),
            })),
        }
    }

    /// Makes `thread` resolve its `load` statements through this loader.
    pub fn install(&self, thread: &mut Thread) {
        let loader = self.clone();
        thread.set_load(move |_, module| loader.load(module));
    }

    pub fn load(&self, module: &str) -> Result<StringDict> {
        let path = self.resolve(module)?;
        let cached = self.state.borrow().modules.get(&path).cloned();
        match cached {
            Some(Some(globals)) => return Ok(globals),
            Some(None) => bail!("cycle in load graph"),
            None => {}
        }

        debug!(module, path = %path.display(), "loading module");
        let options = self.state.borrow().options;
        self.state.borrow_mut().modules.insert(path.clone(), None);
        let result = self.exec(module, &path, options);
        let mut state = self.state.borrow_mut();
        match result {
            Ok(globals) => {
                state.modules.insert(path, Some(globals.clone()));
                Ok(globals)
            }
            Err(err) => {
                state.modules.remove(&path);
                Err(err)
            }
        }
    }

    fn resolve(&self, module: &str) -> Result<PathBuf> {
        let relative = sanitize_path(module)?;
        if relative.is_absolute() {
            bail!("load of absolute path '{module}' is not allowed");
        }
        Ok(self.state.borrow().base_dir.join(relative))
    }

    fn exec(&self, module: &str, path: &Path, options: FileOptions) -> Result<StringDict> {
        let program = Arc::new(load_program(path, options)?);
        let mut thread = stdout_thread(options).with_name(module);
        self.install(&mut thread);
        let (globals, result) = program.init(&mut thread, StringDict::new());
        result?;
        globals.freeze();
        Ok(globals)
    }
}
