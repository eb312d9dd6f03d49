use std::path::Path;

use super::{canonical::FACE_MESH_TRIANGLES, delaunay};
use crate::error::{Result, TryOnError};
use crate::landmarks::FACE_LANDMARK_COUNT;
use crate::types::LandmarkSet;

/// Fixed triangle table over the face mesh landmarks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FaceTopology {
    triangles: Vec<[u32; 3]>,
}

impl FaceTopology {
    pub fn new(triangles: Vec<[u32; 3]>) -> Result<Self> {
        if triangles.is_empty() {
            return Err(TryOnError::Topology("no triangles".to_string()));
        }
        if let Some(bad) = triangles
            .iter()
            .flatten()
            .find(|&&idx| idx as usize >= FACE_LANDMARK_COUNT)
        {
            return Err(TryOnError::Topology(format!(
                "index {bad} out of range for {FACE_LANDMARK_COUNT} landmarks"
            )));
        }
        Ok(Self { triangles })
    }

    /// The detector's own tessellation of its 468 landmarks.
    pub fn canonical() -> Self {
        Self {
            triangles: FACE_MESH_TRIANGLES.to_vec(),
        }
    }

    /// Whitespace or comma separated indices, three per triangle. `#` starts a comment.
    pub fn parse(s: &str) -> Result<Self> {
        let mut flat = Vec::new();
        for (line_no, line) in s.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("");
            for token in line
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|t| !t.is_empty())
            {
                let idx = token.parse::<u32>().map_err(|e| {
                    TryOnError::Topology(format!("line {}: {token:?}: {e}", line_no + 1))
                })?;
                flat.push(idx);
            }
        }
        if flat.len() % 3 != 0 {
            return Err(TryOnError::Topology(format!(
                "{} indices is not a multiple of 3",
                flat.len()
            )));
        }
        Self::new(
            flat.chunks_exact(3)
                .map(|c| [c[0], c[1], c[2]])
                .collect(),
        )
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&contents)
    }

    /// Triangulate the image-plane layout of a complete face.
    ///
    /// Unlike [`FaceTopology::canonical`] this closes the mouth and depends on
    /// the pose of the face it was derived from.
    pub fn derive(face: &LandmarkSet) -> Option<Self> {
        if face.len() < FACE_LANDMARK_COUNT {
            return None;
        }
        let mut points = Vec::with_capacity(FACE_LANDMARK_COUNT);
        for idx in 0..FACE_LANDMARK_COUNT {
            let lm = face.get(idx)?;
            points.push([lm.x, lm.y]);
        }
        let triangles = delaunay::triangulate(&points);
        Self::new(triangles).ok()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn indices(&self) -> Vec<u32> {
        self.triangles.iter().flatten().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::fixtures::front_face;
    use std::collections::{HashMap, HashSet};

    #[test]
    fn parse_table_with_comments() {
        let topo = FaceTopology::parse("# face\n0 1 2\n2, 3, 4 # tail\n").unwrap();
        assert_eq!(topo.triangle_count(), 2);
        assert_eq!(topo.indices(), vec![0, 1, 2, 2, 3, 4]);
    }

    #[test]
    fn ragged_table_is_rejected() {
        assert!(FaceTopology::parse("0 1 2 3").is_err());
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        assert!(FaceTopology::parse("0 1 468").is_err());
    }

    #[test]
    fn canonical_table_covers_every_landmark() {
        let topo = FaceTopology::canonical();
        assert_eq!(topo.triangle_count(), 880);
        assert_eq!(FaceTopology::new(topo.triangles.clone()).unwrap(), topo);

        let used: HashSet<u32> = topo.indices().into_iter().collect();
        assert_eq!(used.len(), FACE_LANDMARK_COUNT);
        assert!(topo.triangles.iter().all(|[a, b, c]| a != b && b != c && a != c));
    }

    #[test]
    fn canonical_table_is_a_consistently_wound_surface() {
        let topo = FaceTopology::canonical();
        let mut directed = HashSet::new();
        let mut undirected: HashMap<(u32, u32), u32> = HashMap::new();
        for &[a, b, c] in &topo.triangles {
            for (x, y) in [(a, b), (b, c), (c, a)] {
                assert!(directed.insert((x, y)), "edge {x}->{y} wound twice");
                *undirected.entry((x.min(y), x.max(y))).or_default() += 1;
            }
        }
        assert!(undirected.values().all(|&n| n <= 2));

        // Open edges run only along the face oval and the inner lips.
        let open: HashSet<u32> = undirected
            .iter()
            .filter(|(_, n)| **n == 1)
            .flat_map(|(&(x, y), _)| [x, y])
            .collect();
        for idx in [10, 152, 234, 454, 13, 14, 78, 308] {
            assert!(open.contains(&idx), "{idx} should be on the boundary");
        }
        for idx in [1, 4, 33, 133, 263, 362, 159, 386] {
            assert!(!open.contains(&idx), "{idx} should be interior");
        }
        assert_eq!(open.len(), 56);
    }

    #[test]
    fn derived_topology_indexes_the_face() {
        let topo = FaceTopology::derive(&front_face(90.0)).unwrap();
        assert!(topo.triangle_count() > FACE_LANDMARK_COUNT / 2);
        assert!(topo.indices().iter().all(|&i| (i as usize) < FACE_LANDMARK_COUNT));
    }
}
