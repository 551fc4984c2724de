//! The shell driver
//!
//! [`Shell`] parses the arguments make hands to its `SHELL`, builds the execution context,
//! runs it through the plugin chain and logs the resulting exit status.

use std::any::Any;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;

use clap::builder::NonEmptyStringValueParser;
use clap::parser::MatchesError;
use clap::{Arg, ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser};
use log::Level;
use thiserror::Error;

use crate::chain::PluginChain;
use crate::config_file::Config;
use crate::context::{AttrValue, ExecutionContext};
use crate::executor::ExecuteCommand;
use crate::logger::{Sink, level_for_exit_code};

#[derive(Error, Debug)]
pub enum ShellError {
    /// Invalid command line, including requests for `--help` and `--version`.
    #[error(transparent)]
    Usage(#[from] clap::Error),
    /// An extra argument parsed into a type that cannot be stored as an attribute.
    #[error("Value of argument `{name}` cannot be stored as an attribute: {source}")]
    UnsupportedValue { name: String, source: MatchesError },
}

#[derive(Parser, Debug)]
#[command(name = "trackingshell", version, about = "Tracks makefile targets")]
struct Cli {
    /// Name of the make target
    #[arg(short, long, num_args = 0..=1)]
    target: Option<String>,

    /// Command to execute
    #[arg(short, long, allow_hyphen_values = true, value_parser = NonEmptyStringValueParser::new())]
    command: String,
}

/// Additional command line argument whose value becomes a context attribute.
#[derive(Debug, Clone)]
pub struct ExtraArgument {
    arg: Arg,
}

impl ExtraArgument {
    /// `--name <VALUE>`, stored as a string attribute.
    #[must_use]
    pub fn value(name: &str) -> Self {
        Self::with_action(name, ArgAction::Set)
    }

    /// `--name`, stored as a boolean attribute.
    #[must_use]
    pub fn flag(name: &str) -> Self {
        Self::with_action(name, ArgAction::SetTrue)
    }

    /// `--name <VALUE>` given any number of times, stored as a list attribute.
    #[must_use]
    pub fn list(name: &str) -> Self {
        Self::with_action(name, ArgAction::Append)
    }

    fn with_action(name: &str, action: ArgAction) -> Self {
        Self {
            arg: Arg::new(name.to_string())
                .long(name.to_string())
                .action(action),
        }
    }

    #[must_use]
    pub fn short(mut self, short: char) -> Self {
        self.arg = self.arg.short(short);
        self
    }

    #[must_use]
    pub fn help(mut self, help: &str) -> Self {
        self.arg = self.arg.help(help.to_string());
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: &str) -> Self {
        self.arg = self.arg.default_value(value.to_string());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.arg.get_id().as_str()
    }

    /// Attribute value parsed for this argument, if any.
    ///
    /// `Append` arguments always give a list; other actions give their single value.
    ///
    /// # Errors
    ///
    /// Returns `ShellError::UnsupportedValue` if the value parser of the argument produces
    /// a type other than strings, paths, booleans or integers.
    fn attribute(&self, matches: &ArgMatches) -> Result<Option<AttrValue>, ShellError> {
        let id = self.name();
        let values = parsed::<String>(matches, id)
            .or_else(|_| parsed::<bool>(matches, id))
            .or_else(|_| parsed::<i64>(matches, id))
            .or_else(|_| parsed::<u8>(matches, id))
            .or_else(|_| parsed::<u16>(matches, id))
            .or_else(|_| parsed::<u32>(matches, id))
            .or_else(|_| parsed::<i32>(matches, id))
            .or_else(|_| parsed::<u64>(matches, id))
            .or_else(|_| parsed::<PathBuf>(matches, id))
            .map_err(|source| ShellError::UnsupportedValue {
                name: id.to_string(),
                source,
            })?;

        let Some(mut values) = values else {
            return Ok(None);
        };
        if values.len() == 1 && !matches!(self.arg.get_action(), ArgAction::Append) {
            return Ok(values.pop());
        }
        Ok(Some(AttrValue::List(values)))
    }
}

/// Every value stored for `id`, if its parsed type is `T`.
fn parsed<T>(matches: &ArgMatches, id: &str) -> Result<Option<Vec<AttrValue>>, MatchesError>
where
    T: Any + Clone + Send + Sync + Into<AttrValue>,
{
    let values = matches.try_get_many::<T>(id)?;
    Ok(values.map(|values| values.cloned().map(Into::into).collect()))
}

impl From<Arg> for ExtraArgument {
    fn from(arg: Arg) -> Self {
        Self { arg }
    }
}

/// Drives one command invocation through the plugin chain.
pub struct Shell {
    args: Vec<OsString>,
    extra_arguments: Vec<ExtraArgument>,
    attributes: BTreeMap<String, AttrValue>,
    plugins: PluginChain,
    sink: Sink,
    context: Option<ExecutionContext>,
}

impl Shell {
    /// Shell for `args`, given without the program name.
    #[must_use]
    pub fn new<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            extra_arguments: Vec::new(),
            attributes: BTreeMap::new(),
            plugins: PluginChain::default(),
            sink: Sink::default(),
            context: None,
        }
    }

    /// Shell for the arguments of the current process.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(std::env::args_os().skip(1))
    }

    /// Declare an extra argument before the arguments are parsed.
    pub fn add_argument(&mut self, argument: impl Into<ExtraArgument>) -> &mut Self {
        self.extra_arguments.push(argument.into());
        self
    }

    /// Attribute set on every context before the extra arguments are applied.
    pub fn set_attribute(
        &mut self,
        key: impl Into<String>,
        value: impl Into<AttrValue>,
    ) -> &mut Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn set_sink(&mut self, sink: Sink) -> &mut Self {
        self.sink = sink;
        self
    }

    pub fn set_plugins(&mut self, plugins: PluginChain) -> &mut Self {
        self.plugins = plugins;
        self
    }

    /// Apply a loaded config: interpreter, static attributes, extra arguments and built-in
    /// plugins, in that order. Plugins registered before keep running first.
    ///
    /// A configured `shell` replaces the terminal executor of the chain with an
    /// [`ExecuteCommand`] for that interpreter, including a custom terminal installed with
    /// [`Shell::set_plugins`]. Without `shell` the terminal is left as it is.
    pub fn apply_config(&mut self, config: &Config) -> &mut Self {
        if let Some(shell) = &config.shell {
            let mut chain = PluginChain::new(ExecuteCommand::new(shell));
            for plugin in &self.plugins.plugins()[..self.plugins.len() - 1] {
                chain.register(plugin.clone());
            }
            self.plugins = chain;
        }
        for (key, value) in &config.attributes {
            self.set_attribute(key, value.clone());
        }
        for argument in config.extra_arguments() {
            self.add_argument(argument);
        }
        for plugin in config.plugins() {
            self.plugins.register(plugin);
        }
        self
    }

    #[must_use]
    pub fn plugins(&self) -> &PluginChain {
        &self.plugins
    }

    pub fn plugins_mut(&mut self) -> &mut PluginChain {
        &mut self.plugins
    }

    /// Context of the last invocation.
    #[must_use]
    pub fn context(&self) -> Option<&ExecutionContext> {
        self.context.as_ref()
    }

    fn command(&self) -> clap::Command {
        let mut command = Cli::command();
        for extra in &self.extra_arguments {
            command = command.arg(extra.arg.clone());
        }
        command
    }

    fn parse(&self) -> Result<ExecutionContext, ShellError> {
        let program = OsString::from("trackingshell");
        let matches = self
            .command()
            .try_get_matches_from(std::iter::once(&program).chain(&self.args))?;
        let cli = Cli::from_arg_matches(&matches)?;

        let mut ctx = ExecutionContext::new(cli.target, cli.command)
            .with_attributes(self.attributes.clone())
            .with_sink(self.sink.clone());
        for extra in &self.extra_arguments {
            if let Some(value) = extra.attribute(&matches)? {
                ctx.set(extra.name(), value);
            }
        }
        Ok(ctx)
    }

    /// Parse the arguments, run the command through the plugin chain and return its exit
    /// status.
    ///
    /// A failing command is not an error: its status is returned and logged at error level.
    ///
    /// # Errors
    ///
    /// Returns `ShellError::Usage` if the arguments cannot be parsed, or
    /// `ShellError::UnsupportedValue` if an extra argument value cannot become an attribute.
    /// Either happens before any plugin runs.
    pub fn delegate(&mut self) -> Result<i32, ShellError> {
        let mut ctx = self.parse()?;
        self.sink
            .emit(Level::Debug, format_args!("Executing {ctx}"), &ctx.as_map());

        let exit_code = self.plugins.execute(&mut ctx);

        self.sink.emit(
            level_for_exit_code(exit_code, Level::Info, Level::Error),
            format_args!("Command execution is finished with exit code {exit_code}"),
            &ctx.as_map(),
        );
        self.sink.flush();

        self.context = Some(ctx);
        Ok(exit_code)
    }
}

impl std::fmt::Debug for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell")
            .field("args", &self.args)
            .field("plugins", &self.plugins)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::value_parser;

    use crate::context::WITHOUT_TARGET;
    use crate::plugin::{PluginExt, plugin_fn};

    fn stubbed(args: &[&str]) -> Shell {
        let mut shell = Shell::new(args);
        shell.set_plugins(PluginChain::new(plugin_fn("terminal", |ctx, _| {
            i32::from(ctx.command() != "true")
        })));
        shell
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_target_forms() {
        let mut shell = stubbed(&["-t", "test-target", "-c", "true"]);
        assert_eq!(shell.delegate().unwrap(), 0);
        assert_eq!(shell.context().unwrap().target(), "test-target");

        let mut shell = stubbed(&["-t", "-c", "true"]);
        shell.delegate().unwrap();
        assert_eq!(shell.context().unwrap().target(), WITHOUT_TARGET);

        let mut shell = stubbed(&["--target=", "-c", "true"]);
        shell.delegate().unwrap();
        assert!(!shell.context().unwrap().has_target());
    }

    #[test]
    fn test_command_may_start_with_a_dash() {
        let mut shell = stubbed(&["-c", "-n"]);
        assert_eq!(shell.delegate().unwrap(), 1);
        assert_eq!(shell.context().unwrap().command(), "-n");
    }

    #[test]
    fn test_usage_errors() {
        let cases: [&[&str]; 4] = [&[], &["-c"], &["-c", ""], &["-c", "true", "--bogus"]];
        for args in cases {
            let mut shell = stubbed(args);
            let result = shell.delegate();
            assert!(matches!(result, Err(ShellError::Usage(_))), "{args:?}");
            assert!(shell.context().is_none());
        }
    }

    #[test]
    fn test_extra_argument_kinds() {
        let mut shell = stubbed(&[
            "-d",
            "2015-08-25",
            "--dry-run",
            "--tag",
            "a",
            "--tag",
            "b",
            "-c",
            "true",
        ]);
        shell
            .add_argument(ExtraArgument::value("date").short('d'))
            .add_argument(ExtraArgument::flag("dry-run"))
            .add_argument(ExtraArgument::list("tag"))
            .add_argument(Arg::new("verbose").short('v').action(ArgAction::Count));
        shell.delegate().unwrap();

        let ctx = shell.context().unwrap();
        assert_eq!(ctx.get("date"), Some(&AttrValue::from("2015-08-25")));
        assert_eq!(ctx.get("dry-run"), Some(&AttrValue::Bool(true)));
        assert_eq!(ctx.get("tag"), Some(&AttrValue::from(vec!["a", "b"])));
        assert_eq!(ctx.get("verbose"), Some(&AttrValue::Int(0)));
    }

    #[test]
    fn test_missing_extra_argument() {
        let mut shell = stubbed(&["-c", "true"]);
        shell
            .set_attribute("owner", "from-config")
            .add_argument(ExtraArgument::value("date"))
            .add_argument(ExtraArgument::value("owner"))
            .add_argument(ExtraArgument::value("team").default_value("data"));
        shell.delegate().unwrap();

        let ctx = shell.context().unwrap();
        assert_eq!(ctx.get("date"), None);
        assert_eq!(ctx.get("owner"), Some(&AttrValue::from("from-config")));
        assert_eq!(ctx.get("team"), Some(&AttrValue::from("data")));
    }

    #[test]
    fn test_argument_overrides_attribute() {
        let mut shell = stubbed(&["--owner", "cli", "-c", "true"]);
        shell
            .set_attribute("owner", "from-config")
            .add_argument(ExtraArgument::value("owner"));
        shell.delegate().unwrap();
        assert_eq!(
            shell.context().unwrap().get("owner"),
            Some(&AttrValue::from("cli"))
        );
    }

    #[test]
    fn test_attributes_reach_the_context() {
        let mut shell = stubbed(&["-c", "true"]);
        shell
            .set_attribute("team", "data")
            .set_attribute("priority", 3_i64);
        shell.delegate().unwrap();
        let ctx = shell.context().unwrap();
        assert_eq!(ctx.get("team"), Some(&AttrValue::from("data")));
        assert_eq!(ctx.get("priority"), Some(&AttrValue::Int(3)));
    }

    #[test]
    fn test_apply_config() {
        let yaml = "
shell: /bin/bash
attributes:
  team: data
arguments:
  - name: date
    short: d
plugins:
  - name: timing
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        let mut shell = Shell::new(["-d", "2015-08-25", "-c", "exit 4"]);
        shell
            .plugins_mut()
            .register(plugin_fn("early", |ctx, next| next.run(ctx)).shared());
        shell.apply_config(&config);
        assert_eq!(
            shell.plugins().names(),
            vec!["early", "timing", "execute_command"]
        );

        assert_eq!(shell.delegate().unwrap(), 4);
        let ctx = shell.context().unwrap();
        assert_eq!(ctx.get("team"), Some(&AttrValue::from("data")));
        assert_eq!(ctx.get("date"), Some(&AttrValue::from("2015-08-25")));
        assert!(ctx.contains(crate::builtin::timing::DURATION_ATTR));
    }

    fn long(name: &'static str) -> Arg {
        Arg::new(name).long(name)
    }

    #[test]
    fn test_typed_argument_values() {
        let mut shell = stubbed(&[
            "--retries",
            "5",
            "--port",
            "8080",
            "--out",
            "build/log.txt",
            "--job",
            "1",
            "--job",
            "2",
            "-c",
            "true",
        ]);
        let jobs = long("job")
            .action(ArgAction::Append)
            .value_parser(value_parser!(u64));
        shell
            .add_argument(long("retries").value_parser(value_parser!(i64)))
            .add_argument(long("port").value_parser(value_parser!(u16)))
            .add_argument(long("out").value_parser(value_parser!(PathBuf)))
            .add_argument(jobs);
        shell.delegate().unwrap();

        let ctx = shell.context().unwrap();
        assert_eq!(ctx.get("retries"), Some(&AttrValue::Int(5)));
        assert_eq!(ctx.get("port"), Some(&AttrValue::Int(8080)));
        assert_eq!(ctx.get("out"), Some(&AttrValue::from("build/log.txt")));
        assert_eq!(ctx.get("job"), Some(&AttrValue::from(vec![1_i64, 2])));
    }

    #[test]
    fn test_unsupported_value_type_is_an_error() {
        let mut shell = stubbed(&["--addr", "127.0.0.1", "-c", "true"]);
        shell.add_argument(long("addr").value_parser(value_parser!(std::net::IpAddr)));
        match shell.delegate() {
            Err(ShellError::UnsupportedValue { name, .. }) => assert_eq!(name, "addr"),
            other => panic!("Expected UnsupportedValue, got: {other:?}"),
        }
        assert!(shell.context().is_none());
    }

    #[test]
    fn test_configured_flag_default() {
        let yaml = "
arguments:
  - name: dry
    flag: true
    default: 'true'
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        let mut shell = stubbed(&["-c", "true"]);
        shell.apply_config(&config);
        shell.delegate().unwrap();
        assert_eq!(
            shell.context().unwrap().get("dry"),
            Some(&AttrValue::Bool(true))
        );
    }

    #[test]
    fn test_configured_shell_replaces_the_terminal() {
        let mut shell = stubbed(&["-c", "true"]);
        shell.apply_config(&Config::default());
        assert_eq!(shell.plugins().names(), vec!["terminal"]);

        let config = Config {
            shell: Some(PathBuf::from("/bin/bash")),
            ..Default::default()
        };
        shell.apply_config(&config);
        assert_eq!(shell.plugins().names(), vec!["execute_command"]);
    }
}
