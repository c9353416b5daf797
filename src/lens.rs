//! Pure accessors into an aggregate state.
//!
//! A [`Lens`] reads one named part of a whole and writes a new whole with that
//! part replaced, leaving siblings untouched. Accessors are zero-sized structs
//! generated with [`lens!`](crate::lens!), so composing them costs nothing at
//! runtime.

pub trait Lens<W>: Send + Sync {
    type Part;

    fn get<'a>(&self, whole: &'a W) -> &'a Self::Part;

    fn set(&self, whole: W, part: Self::Part) -> W;

    /// Applies `f` to the focused part.
    fn modify(&self, whole: W, f: impl FnOnce(&Self::Part) -> Self::Part) -> W
    where
        Self: Sized,
    {
        let part = f(self.get(&whole));
        self.set(whole, part)
    }
}

/// Declares a zero-sized accessor for a struct field.
///
/// ```ignore
/// lens!(pub CoreLens: TwammState => core: FullRangePoolState);
/// ```
#[macro_export]
macro_rules! lens {
    ($(#[$meta:meta])* $vis:vis $name:ident : $whole:ty => $field:ident : $part:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        $vis struct $name;

        impl $crate::lens::Lens<$whole> for $name {
            type Part = $part;

            fn get<'a>(&self, whole: &'a $whole) -> &'a $part {
                &whole.$field
            }

            fn set(&self, mut whole: $whole, part: $part) -> $whole {
                whole.$field = part;
                whole
            }
        }
    };
}

/// Focuses the whole value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Identity;

impl<W> Lens<W> for Identity {
    type Part = W;

    fn get<'a>(&self, whole: &'a W) -> &'a W {
        whole
    }

    fn set(&self, _whole: W, part: W) -> W {
        part
    }
}

/// `outer` then `inner`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Compose<A, B> {
    pub outer: A,
    pub inner: B,
}

impl<A, B> Compose<A, B> {
    pub fn new(outer: A, inner: B) -> Self {
        Self { outer, inner }
    }
}

impl<W, M, A, B> Lens<W> for Compose<A, B>
where
    A: Lens<W, Part = M>,
    B: Lens<M>,
    M: Clone + 'static,
{
    type Part = B::Part;

    fn get<'a>(&self, whole: &'a W) -> &'a Self::Part {
        self.inner.get(self.outer.get(whole))
    }

    fn set(&self, whole: W, part: Self::Part) -> W {
        let middle = self.inner.set(self.outer.get(&whole).clone(), part);
        self.outer.set(whole, middle)
    }
}
