use codex_asar_patcher::tools::beautified_path;
use codex_asar_patcher::{
    ArchiveTool, Beautifier, RunMode, SessionOptions, SyntaxValidator, ToolError, Toolchain,
};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;
use walkdir::WalkDir;

pub const BUNDLE_PATH: &str = "webview/assets/index-Ab12Cd.js";

pub const INDEX_HTML: &str = r#"<!doctype html>
<html>
  <head>
    <script type="module" crossorigin src="./assets/index-Ab12Cd.js"></script>
  </head>
  <body><div id="root"></div></body>
</html>
"#;

/// One occurrence of each built-in rule's unpatched shape.
pub const BUNDLE: &str = concat!(
    r#"function A(r,s,Tt){for(const a of r){if(a.type==="reasoning"){s&&s.push(a);continue}s&&Tt("explored")}}"#,
    "\n",
    r#"function B(l,k){const d=()=>{l(k?"preview":"collapsed")};return d}"#,
    "\n",
    r#"function C(t,u,o){let h;{h=u,o.type==="reasoning"&&(h=null)}let p;t[4]!==h&&(p=h)}"#,
    "\n",
    "function D(w,g,m){if(!w){g(!1);return}const e=m.current;}",
    "\n",
    "function E(n){const f=n.current;f&&(f.scrollTop=f.scrollHeight)}",
    "\n",
);

pub const TIMESTAMP: &str = "20260101T000000Z";

pub type CallLog = Rc<RefCell<Vec<&'static str>>>;

/// Write a fake archive holding `files` to `path`.
pub fn write_archive(path: &Path, files: &[(&str, &str)]) {
    let map: BTreeMap<&str, &str> = files.iter().copied().collect();
    fs::write(path, serde_json::to_vec_pretty(&map).unwrap()).unwrap();
}

/// Read a fake archive back into a map.
pub fn read_archive(path: &Path) -> BTreeMap<String, String> {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

/// Archive directory with `app.asar` holding the webview index and `bundle`.
pub struct Workspace {
    pub dir: TempDir,
    pub scratch: TempDir,
    pub archive: PathBuf,
}

impl Workspace {
    pub fn new(bundle: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let archive = dir.path().join("app.asar");
        write_archive(
            &archive,
            &[
                ("package.json", r#"{"name":"codex","main":"main.js"}"#),
                ("webview/index.html", INDEX_HTML),
                (BUNDLE_PATH, bundle),
            ],
        );
        Self {
            dir,
            scratch,
            archive,
        }
    }

    pub fn options(&self, mode: RunMode) -> SessionOptions {
        let mut options = SessionOptions::new(mode);
        options.scratch_dir = self.scratch.path().to_path_buf();
        options.timestamp = TIMESTAMP.to_string();
        options
    }

    pub fn bundle_text(&self) -> String {
        read_archive(&self.archive)
            .remove(BUNDLE_PATH)
            .expect("bundle present in archive")
    }

    /// File names next to the archive, sorted.
    pub fn archive_dir_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn scratch_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.scratch.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

fn failed(command: &str) -> ToolError {
    ToolError::Failed {
        command: command.to_string(),
        status: "1".to_string(),
        output: "simulated failure".to_string(),
    }
}

pub struct FakeArchive {
    pub calls: CallLog,
    pub fail_pack: bool,
}

impl ArchiveTool for FakeArchive {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<(), ToolError> {
        self.calls.borrow_mut().push("extract");
        for (rel, content) in read_archive(archive) {
            let path = dest.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        Ok(())
    }

    fn pack(&self, src: &Path, archive: &Path) -> Result<(), ToolError> {
        self.calls.borrow_mut().push("pack");
        if self.fail_pack {
            return Err(failed("fake pack"));
        }
        let mut map = BTreeMap::new();
        for entry in WalkDir::new(src).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(src).unwrap();
            map.insert(
                rel.to_string_lossy().replace('\\', "/"),
                fs::read_to_string(entry.path()).unwrap(),
            );
        }
        fs::write(archive, serde_json::to_vec_pretty(&map).unwrap()).unwrap();
        Ok(())
    }
}

pub struct FakeValidator {
    pub calls: CallLog,
    pub fail: bool,
}

impl SyntaxValidator for FakeValidator {
    fn validate(&self, _document: &Path) -> Result<(), ToolError> {
        self.calls.borrow_mut().push("validate");
        if self.fail {
            return Err(failed("fake node --check"));
        }
        Ok(())
    }
}

pub struct FakeBeautifier {
    pub calls: CallLog,
    pub fail: bool,
}

impl Beautifier for FakeBeautifier {
    fn beautify(&self, document: &Path) -> Result<PathBuf, ToolError> {
        self.calls.borrow_mut().push("beautify");
        if self.fail {
            return Err(failed("fake js-beautify"));
        }
        let output = beautified_path(document);
        let text = fs::read_to_string(document).unwrap();
        fs::write(&output, text.replace(';', ";\n")).unwrap();
        Ok(output)
    }
}

/// Which fakes should fail.
#[derive(Default, Clone, Copy)]
pub struct Failures {
    pub pack: bool,
    pub validate: bool,
    pub beautify: bool,
}

pub fn toolchain(failures: Failures) -> (Toolchain, CallLog) {
    let calls: CallLog = Rc::default();
    let tools = Toolchain {
        archive: Box::new(FakeArchive {
            calls: calls.clone(),
            fail_pack: failures.pack,
        }),
        validator: Box::new(FakeValidator {
            calls: calls.clone(),
            fail: failures.validate,
        }),
        beautifier: Box::new(FakeBeautifier {
            calls: calls.clone(),
            fail: failures.beautify,
        }),
    };
    (tools, calls)
}
