/// Render a message template, substituting `{name}` placeholders.
///
/// `msg!(MESSAGES.run.project_failed, project = name, error = e.to_string())`
/// expands to a [`MessageBuilder`](crate::builder::MessageBuilder) chain.
/// Placeholders without a value are left as written.
#[macro_export]
macro_rules! msg {
    ($template:expr) => {
        $crate::builder::MessageBuilder::new($template).build()
    };
    ($template:expr, $($key:ident = $value:expr),+ $(,)?) => {
        {
            let mut builder = $crate::builder::MessageBuilder::new($template);
            $(
                builder = builder.var(stringify!($key), $value);
            )+
            builder.build()
        }
    };
}
