//! Parsing of host function arguments passed by the interpreter.
use wasmi::{FromValue, RuntimeArgs, Trap};

/// Parses a full `RuntimeArgs` tuple in one step.
pub(crate) trait Args: Sized {
    fn parse(args: RuntimeArgs) -> Result<Self, Trap>;
}

macro_rules! impl_args_for_tuple {
    ($($name:ident : $index:tt),+) => {
        impl<$($name),+> Args for ($($name,)+)
        where
            $($name: FromValue,)+
        {
            fn parse(args: RuntimeArgs) -> Result<Self, Trap> {
                Ok(($(args.nth_checked::<$name>($index)?,)+))
            }
        }
    };
}

impl_args_for_tuple!(T0: 0);
impl_args_for_tuple!(T0: 0, T1: 1);
impl_args_for_tuple!(T0: 0, T1: 1, T2: 2);
impl_args_for_tuple!(T0: 0, T1: 1, T2: 2, T3: 3);
impl_args_for_tuple!(T0: 0, T1: 1, T2: 2, T3: 3, T4: 4);
impl_args_for_tuple!(T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5);
impl_args_for_tuple!(T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5, T6: 6);
impl_args_for_tuple!(T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5, T6: 6, T7: 7);
impl_args_for_tuple!(T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5, T6: 6, T7: 7, T8: 8);
