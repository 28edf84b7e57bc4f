use std::{
    fmt::{self, Display},
    path::PathBuf,
    str::FromStr,
};

use rand::{rngs::StdRng, SeedableRng};

use crate::{
    config::TrainerConfig,
    error::{Result, TrainErr},
};

/// The hosts of a parameter-server/worker cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSpec {
    pub ps_hosts: Vec<String>,
    pub worker_hosts: Vec<String>,
}

impl ClusterSpec {
    /// Parses comma-separated host lists, ignoring blank entries.
    ///
    /// # Returns
    /// An error if no worker host is given.
    pub fn parse(ps_hosts: &str, worker_hosts: &str) -> Result<Self> {
        let split = |hosts: &str| -> Vec<String> {
            hosts
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(String::from)
                .collect()
        };

        let spec = Self {
            ps_hosts: split(ps_hosts),
            worker_hosts: split(worker_hosts),
        };

        if spec.worker_hosts.is_empty() {
            return Err(TrainErr::InvalidConfig(
                "at least one worker host is required".into(),
            ));
        }

        Ok(spec)
    }
}

/// The role this process plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobName {
    ParameterServer,
    Worker,
}

impl FromStr for JobName {
    type Err = TrainErr;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ps" => Ok(JobName::ParameterServer),
            "worker" => Ok(JobName::Worker),
            other => Err(TrainErr::InvalidConfig(format!("unknown job name: {other}"))),
        }
    }
}

impl Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobName::ParameterServer => f.write_str("ps"),
            JobName::Worker => f.write_str("worker"),
        }
    }
}

/// Everything a training run needs to know about where it executes.
///
/// Built once from the configuration and handed to the orchestrator instead of living in
/// process-wide state.
#[derive(Debug)]
pub struct TrainingContext {
    pub cluster: ClusterSpec,
    pub job: JobName,
    pub task_index: usize,
    pub gpu: usize,
    pub model_dir: PathBuf,
    pub sample_dir: PathBuf,
    pub rng: StdRng,
}

impl TrainingContext {
    /// Creates a new `TrainingContext` from the cluster and output options of `config`.
    ///
    /// The random number generator is seeded from `config.seed`, or from the OS otherwise.
    pub fn from_config(config: &TrainerConfig) -> Result<Self> {
        let cluster = ClusterSpec::parse(&config.ps_hosts, &config.worker_hosts)?;
        let job: JobName = config.job_name.parse()?;

        let hosts = match job {
            JobName::ParameterServer => cluster.ps_hosts.len(),
            JobName::Worker => cluster.worker_hosts.len(),
        };

        if config.task_index >= hosts {
            return Err(TrainErr::InvalidConfig(format!(
                "task_index ({}) is out of range for {hosts} {job} host(s)",
                config.task_index
            )));
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            cluster,
            job,
            task_index: config.task_index,
            gpu: config.gpu,
            model_dir: config.model_dir.clone(),
            sample_dir: config.sample_dir.clone(),
            rng,
        })
    }

    /// The first worker owns checkpoints and summaries.
    pub fn is_chief(&self) -> bool {
        self.job == JobName::Worker && self.task_index == 0
    }

    /// Device the worker's ops are pinned to.
    pub fn worker_device(&self) -> String {
        format!(
            "/job:worker/replica:0/task:{}/gpu:{}",
            self.task_index, self.gpu
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hosts() {
        let spec = ClusterSpec::parse("ps0:2222, ps1:2222", "w0:2223,,w1:2223 ,").unwrap();
        assert_eq!(spec.ps_hosts, vec!["ps0:2222", "ps1:2222"]);
        assert_eq!(spec.worker_hosts, vec!["w0:2223", "w1:2223"]);
    }

    #[test]
    fn workers_required() {
        assert!(ClusterSpec::parse("ps0:2222", " , ").is_err());
    }

    #[test]
    fn job_names() {
        assert_eq!("ps".parse::<JobName>().unwrap(), JobName::ParameterServer);
        assert_eq!("worker".parse::<JobName>().unwrap(), JobName::Worker);
        assert!("chief".parse::<JobName>().is_err());
    }

    #[test]
    fn context_from_config() {
        let config = TrainerConfig {
            worker_hosts: "w0:1,w1:1".into(),
            task_index: 1,
            gpu: 3,
            seed: Some(1),
            ..TrainerConfig::default()
        };

        let ctx = TrainingContext::from_config(&config).unwrap();
        assert_eq!(ctx.job, JobName::Worker);
        assert!(!ctx.is_chief());
        assert_eq!(ctx.worker_device(), "/job:worker/replica:0/task:1/gpu:3");
    }

    #[test]
    fn task_index_out_of_range() {
        let config = TrainerConfig {
            task_index: 4,
            ..TrainerConfig::default()
        };
        assert!(TrainingContext::from_config(&config).is_err());
    }
}
