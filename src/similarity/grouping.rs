use super::SimilarityPair;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Trailing " (2)", "_copy", " - Copy 3" markers.
static COPY_SUFFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)(\s*\(\d+\)|[_\-\s]+copy(\s*\d+)?)$").ok());

/// Trailing resolution tags such as "_1920x1080", "-720p", " 4k".
static RESOLUTION_SUFFIX: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)[_\-\s]+((\d{1,4})\s*[x×]\s*(\d{1,4})|\d{3,4}p|[248]k|hd|uhd)$").ok()
});

/// Videos connected by at least one similar pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoGroup {
    pub id: String,
    pub name: String,
    pub videos: Vec<PathBuf>,
    pub best_score: f64,
    pub lowest_score: f64,
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // keep the earlier index as root so group order follows discovery
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child] = root;
        }
    }
}

/// Merge pairs into connected groups.
///
/// Groups come out in the order their first pair appears, so a score-sorted
/// pair list yields the strongest groups first. Members are sorted by path.
pub fn group_pairs(pairs: &[SimilarityPair]) -> Vec<VideoGroup> {
    let mut index: HashMap<&Path, usize> = HashMap::new();
    let mut paths: Vec<&Path> = Vec::new();
    for pair in pairs {
        for path in [pair.path_a.as_path(), pair.path_b.as_path()] {
            index.entry(path).or_insert_with(|| {
                paths.push(path);
                paths.len() - 1
            });
        }
    }

    let mut set = DisjointSet::new(paths.len());
    for pair in pairs {
        set.union(index[pair.path_a.as_path()], index[pair.path_b.as_path()]);
    }

    let mut order: Vec<usize> = Vec::new();
    let mut members: HashMap<usize, Vec<PathBuf>> = HashMap::new();
    for (i, path) in paths.iter().enumerate() {
        let root = set.find(i);
        members
            .entry(root)
            .or_insert_with(|| {
                order.push(root);
                Vec::new()
            })
            .push(path.to_path_buf());
    }

    let mut scores: HashMap<usize, (f64, f64)> = HashMap::new();
    for pair in pairs {
        let root = set.find(index[pair.path_a.as_path()]);
        let entry = scores.entry(root).or_insert((pair.score, pair.score));
        entry.0 = entry.0.max(pair.score);
        entry.1 = entry.1.min(pair.score);
    }

    order
        .into_iter()
        .filter_map(|root| {
            let mut videos = members.remove(&root)?;
            videos.sort();
            let (best_score, lowest_score) = scores.get(&root).copied().unwrap_or((0.0, 0.0));

            let name = videos
                .first()
                .and_then(|path| path.file_name())
                .map(|name| extract_base_name(&name.to_string_lossy()))
                .unwrap_or_default();

            Some(VideoGroup {
                id: uuid::Uuid::new_v4().to_string(),
                name,
                videos,
                best_score,
                lowest_score,
            })
        })
        .collect()
}

/// Display name for a group: file name without extension, copy markers or
/// resolution suffixes.
pub fn extract_base_name(filename: &str) -> String {
    let base = filename
        .rsplit_once('.')
        .map(|(name, _)| name)
        .unwrap_or(filename);

    let base = match COPY_SUFFIX.as_ref() {
        Some(re) => re.replace(base, "").into_owned(),
        None => base.to_string(),
    };

    let base = match RESOLUTION_SUFFIX.as_ref() {
        Some(re) => re.replace(&base, "").into_owned(),
        None => base,
    };

    base.trim().to_string()
}
