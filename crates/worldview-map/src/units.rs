macro_rules! def_units {
    ($t: ident, $unit: literal) => {
        #[doc = concat!("Denotes that the inner `T` is given in units of ", $unit, ".")]
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        pub struct $t<T>(pub T);

        impl<T> $t<T> {
            pub fn into_inner(self) -> T {
                self.0
            }

            pub fn map<S>(self, f: impl FnOnce(T) -> S) -> $t<S> {
                $t(f(self.0))
            }

            pub fn map2<S, R>(u1: Self, u2: $t<S>, f: impl FnOnce(T, S) -> R) -> $t<R> {
                $t(f(u1.into_inner(), u2.into_inner()))
            }
        }
    };
}

def_units!(WorldUnits, "world blocks");
def_units!(ChunkUnits, "chunks");
def_units!(TileUnits, "tiles");
