use super::key::Key;
use super::IdSet;
use crate::error::{EngineError, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

/// Predicate attached to one dimension
#[derive(Clone, Default)]
pub enum Filter {
    /// Accept every record
    #[default]
    All,
    /// Accept keys equal to this one
    Exact(Key),
    /// Accept keys in `[lo, hi)`
    Range { lo: Key, hi: Key },
    /// Accept keys that are members of the set
    Set(BTreeSet<Key>),
    /// Accept pair keys inside the half-open rectangle
    Rect { x: (f64, f64), y: (f64, f64) },
    /// Arbitrary predicate
    Function(Rc<dyn Fn(&Key) -> bool>),
}

impl Filter {
    pub fn range(lo: impl Into<Key>, hi: impl Into<Key>) -> Result<Self> {
        let (lo, hi) = (lo.into(), hi.into());
        if lo > hi {
            return Err(EngineError::invalid(format!("range lower bound {} exceeds upper bound {}", lo, hi)));
        }
        Ok(Filter::Range { lo, hi })
    }

    pub fn rect(x: (f64, f64), y: (f64, f64)) -> Result<Self> {
        if x.0 > x.1 || y.0 > y.1 {
            return Err(EngineError::invalid("rectangle bounds are inverted"));
        }
        Ok(Filter::Rect { x, y })
    }

    pub fn set<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        Filter::Set(keys.into_iter().map(Into::into).collect())
    }

    /// Membership filter over record ids, for dimensions keyed by id
    pub fn ids(ids: &IdSet) -> Self {
        Filter::Set(ids.iter().map(|id| Key::num(id as f64)).collect())
    }

    pub fn function(f: impl Fn(&Key) -> bool + 'static) -> Self {
        Filter::Function(Rc::new(f))
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Filter::All)
    }

    pub fn accepts(&self, key: &Key) -> bool {
        match self {
            Filter::All => true,
            Filter::Exact(k) => key == k,
            Filter::Range { lo, hi } => key >= lo && key < hi,
            Filter::Set(keys) => keys.contains(key),
            Filter::Rect { x, y } => match key.as_pair() {
                Some((kx, ky)) => kx >= x.0 && kx < x.1 && ky >= y.0 && ky < y.1,
                None => false,
            },
            Filter::Function(f) => f(key),
        }
    }

    /// Positions `[start, end)` of accepted keys within an ascending key
    /// sequence, when the accepted keys form one contiguous run.
    pub(crate) fn sorted_span<F>(&self, len: usize, key_at: F) -> Option<(usize, usize)>
    where
        F: Fn(usize) -> Key,
    {
        let partition = |pred: &dyn Fn(&Key) -> bool| -> usize {
            let (mut lo, mut hi) = (0, len);
            while lo < hi {
                let mid = (lo + hi) / 2;
                if pred(&key_at(mid)) {
                    lo = mid + 1;
                } else {
                    hi = mid;
                }
            }
            lo
        };
        match self {
            Filter::All => Some((0, len)),
            Filter::Exact(k) => Some((partition(&|x| x < k), partition(&|x| x <= k))),
            Filter::Range { lo, hi } => Some((partition(&|x| x < lo), partition(&|x| x < hi))),
            _ => None,
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::All => write!(f, "All"),
            Filter::Exact(k) => write!(f, "Exact({})", k),
            Filter::Range { lo, hi } => write!(f, "Range[{}, {})", lo, hi),
            Filter::Set(keys) => write!(f, "Set({} keys)", keys.len()),
            Filter::Rect { x, y } => write!(f, "Rect(x: {:?}, y: {:?})", x, y),
            Filter::Function(_) => write!(f, "Function"),
        }
    }
}
