//! 输入话题标识与输出话题命名
//!
//! 话题名在加载配置时创建一次，之后每轮都会被克隆进槽位表，
//! 所以内部用 `Arc<str>`，克隆只增加引用计数。

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Suffix appended to every input topic to name its synchronized output.
pub const SYNCHRONIZED_SUFFIX: &str = "_synchronized";

/// Output topic name for an input topic.
pub fn synchronized_topic(input_topic: &str) -> String {
    format!("{input_topic}{SYNCHRONIZED_SUFFIX}")
}

/// Input topic name.
///
/// Hashes and orders like the underlying `str`, so `HashMap<TopicId, _>`
/// and `BTreeMap<TopicId, _>` can be queried with a plain `&str`.
///
/// ```
/// use contracts::TopicId;
///
/// let id: TopicId = "/sensing/lidar/top/pointcloud".into();
/// assert_eq!(id.synchronized(), "/sensing/lidar/top/pointcloud_synchronized");
/// ```
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TopicId(Arc<str>);

impl TopicId {
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the output stream carrying this topic's synchronized clouds.
    pub fn synchronized(&self) -> String {
        synchronized_topic(&self.0)
    }
}

impl Deref for TopicId {
    type Target = str;

    #[inline]
    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for TopicId {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TopicId {
    fn from(s: &str) -> Self {
        Self(s.into())
    }
}

impl From<String> for TopicId {
    fn from(s: String) -> Self {
        Self(s.into())
    }
}

impl From<TopicId> for String {
    fn from(id: TopicId) -> Self {
        id.0.as_ref().to_owned()
    }
}

impl PartialEq<str> for TopicId {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for TopicId {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl PartialEq<String> for TopicId {
    fn eq(&self, other: &String) -> bool {
        *self.0 == **other
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    #[test]
    fn test_output_name_appends_suffix() {
        let id = TopicId::from("/lidar/top");
        assert_eq!(id.synchronized(), "/lidar/top_synchronized");
        assert_eq!(synchronized_topic("/a"), "/a_synchronized");
    }

    #[test]
    fn test_clones_share_storage() {
        let a = TopicId::from("/sensing/lidar/left/pointcloud");
        let b = a.clone();
        assert_eq!(a.as_str().as_ptr(), b.as_str().as_ptr());
        assert_eq!(a, "/sensing/lidar/left/pointcloud");
        assert_eq!(a, String::from("/sensing/lidar/left/pointcloud"));
    }

    #[test]
    fn test_map_lookup_by_str() {
        let mut hashed: HashMap<TopicId, u8> = HashMap::new();
        hashed.insert("/lidar/top".into(), 1);
        assert_eq!(hashed.get("/lidar/top"), Some(&1));

        let ordered = BTreeMap::from([
            (TopicId::from("/lidar/right"), 2u8),
            (TopicId::from("/lidar/left"), 1),
        ]);
        assert_eq!(ordered.get("/lidar/left"), Some(&1));
        let keys: Vec<&str> = ordered.keys().map(TopicId::as_str).collect();
        assert_eq!(keys, vec!["/lidar/left", "/lidar/right"]);
    }

    #[test]
    fn test_serde_and_debug_use_plain_string() {
        let id = TopicId::from("/lidar/top");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"/lidar/top\"");
        assert_eq!(format!("{id:?}"), "\"/lidar/top\"");

        let parsed: Vec<TopicId> = serde_json::from_str(r#"["/a", "/b"]"#).unwrap();
        assert_eq!(parsed, vec![TopicId::from("/a"), TopicId::from("/b")]);
    }
}
