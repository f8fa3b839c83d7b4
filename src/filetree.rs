//! Directory listings for decompiler output.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Folder,
    File,
}

/// One entry of a tree. `path` is relative to the tree root and always
/// uses `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileNode {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileNode>>,
}

/// Tree of a job output directory. JADX writes Java under `sources/`; when
/// that exists only it is listed. A missing directory yields an empty tree.
pub fn output_tree(output_dir: &Path) -> io::Result<Vec<FileNode>> {
    if !output_dir.is_dir() {
        return Ok(Vec::new());
    }
    let sources = output_dir.join("sources");
    let root = if sources.is_dir() {
        sources
    } else {
        output_dir.to_path_buf()
    };
    build_file_tree(&root)
}

/// Recursively list `dir`. Folders come before files; each group is sorted
/// by name, case-insensitively. Symlinks are listed as files and never
/// followed.
pub fn build_file_tree(dir: &Path) -> io::Result<Vec<FileNode>> {
    walk(dir, "")
}

fn walk(dir: &Path, prefix: &str) -> io::Result<Vec<FileNode>> {
    let mut nodes = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}/{name}")
        };

        if entry.file_type()?.is_dir() {
            let children = walk(&entry.path(), &path)?;
            nodes.push(FileNode {
                name,
                kind: NodeKind::Folder,
                path,
                children: Some(children),
            });
        } else {
            nodes.push(FileNode {
                name,
                kind: NodeKind::File,
                path,
                children: None,
            });
        }
    }
    nodes.sort_by(compare_nodes);
    Ok(nodes)
}

fn compare_nodes(a: &FileNode, b: &FileNode) -> Ordering {
    match (a.kind, b.kind) {
        (NodeKind::Folder, NodeKind::File) => Ordering::Less,
        (NodeKind::File, NodeKind::Folder) => Ordering::Greater,
        _ => a
            .name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(nodes: &[FileNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn folders_first_then_by_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.java"), "").unwrap();
        fs::write(dir.path().join("A.java"), "").unwrap();
        fs::create_dir(dir.path().join("zeta")).unwrap();
        fs::create_dir(dir.path().join("alpha")).unwrap();

        let tree = build_file_tree(dir.path()).unwrap();
        assert_eq!(names(&tree), ["alpha", "zeta", "A.java", "b.java"]);
        assert_eq!(tree[0].kind, NodeKind::Folder);
        assert_eq!(tree[2].kind, NodeKind::File);
    }

    #[test]
    fn nested_paths_are_relative() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("com/example")).unwrap();
        fs::write(dir.path().join("com/example/Main.java"), "class Main {}").unwrap();

        let tree = build_file_tree(dir.path()).unwrap();
        let com = &tree[0];
        let example = &com.children.as_ref().unwrap()[0];
        let main = &example.children.as_ref().unwrap()[0];
        assert_eq!(example.path, "com/example");
        assert_eq!(main.path, "com/example/Main.java");
        assert_eq!(main.children, None);
    }

    #[test]
    fn output_tree_prefers_sources_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sources/com")).unwrap();
        fs::create_dir_all(dir.path().join("resources")).unwrap();

        let tree = output_tree(dir.path()).unwrap();
        assert_eq!(names(&tree), ["com"]);
    }

    #[test]
    fn output_tree_of_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tree = output_tree(&dir.path().join("absent")).unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn serializes_with_type_field() {
        let node = FileNode {
            name: "Main.java".to_owned(),
            kind: NodeKind::File,
            path: "Main.java".to_owned(),
            children: None,
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "Main.java", "type": "file", "path": "Main.java"})
        );
    }
}
